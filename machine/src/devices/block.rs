/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Block device interface shared by the EMMC driver and the FAT32 volume code, plus
//! an in-memory test double standing in for an SD card in host-side tests.

use snafu::Snafu;

/// Fixed block size used throughout this kernel; matches the SD card sector size.
pub const BLOCK_SIZE: usize = 512;

#[allow(missing_docs)]
#[derive(Debug, Snafu, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    #[snafu(display("block read failed"))]
    ReadFailed,
    #[snafu(display("block write failed after maximum retries"))]
    WriteMaxRetries,
    #[snafu(display("command timed out"))]
    CommandTimeout,
    #[snafu(display("invalid command"))]
    InvalidCommand,
    #[snafu(display("timed out waiting for controller to clear inhibit bits"))]
    InhibitTimeout,
    #[snafu(display("card reported a bad status after SELECT_CARD"))]
    SelectCardBad,
    #[snafu(display("timed out waiting for an SDHC probe response"))]
    SdhcProbeTimeout,
    #[snafu(display("clock did not stabilize"))]
    ClockNotStable,
    #[snafu(display("SET_BLOCKLEN failed"))]
    SetBlockLenFailed,
    #[snafu(display("SEND_SCR failed"))]
    SendScrFailed,
    #[snafu(display("data transfer failed"))]
    TransferDataFailed,
    #[snafu(display("seek offset is out of range for this device"))]
    SeekOutOfRange,
    #[snafu(display("transfer spans more blocks than the controller's scratch buffer holds"))]
    TransferTooLarge,
}

/// Convenience alias for this module's result type.
pub type Result<T> = core::result::Result<T, Error>;

/// A linear sequence of fixed-size blocks, implemented by the EMMC driver and
/// consumed by the FAT32 volume code. `seek`/`read_current` track a cursor so
/// sequential directory and file reads don't need to restate the LBA each call.
pub trait BlockDevice {
    /// Size of one block in bytes. Always 512 for SD cards.
    fn block_size(&self) -> u32 {
        BLOCK_SIZE as u32
    }

    /// Move the device's read cursor to `offset_in_blocks`.
    fn seek(&mut self, offset_in_blocks: u64) -> Result<()>;

    /// Read `n_blocks` starting at `block_lba` into `buf`, returning the count read.
    fn read_block(&mut self, buf: &mut [u8], block_lba: u64, n_blocks: u32) -> Result<u32>;

    /// Read `n_blocks` from the current cursor position, advancing it.
    fn read_current(&mut self, buf: &mut [u8], n_blocks: u32) -> Result<u32>;

    /// Write `n_blocks` starting at `block_lba` from `buf`, returning the count written.
    fn write_block(&mut self, buf: &[u8], block_lba: u64, n_blocks: u32) -> Result<u32>;
}

/// An in-memory stand-in for an SD card, for use in host-side tests of the FAT32
/// layer without requiring real hardware.
pub struct InMemoryBlockDevice {
    blocks: alloc_free::Storage,
    cursor: u64,
}

/// A tiny fixed-capacity byte store, avoiding a dependency on `alloc` in this crate.
mod alloc_free {
    use super::BLOCK_SIZE;

    pub struct Storage {
        data: &'static mut [u8],
    }

    impl Storage {
        pub fn new(data: &'static mut [u8]) -> Self {
            Self { data }
        }

        pub fn total_blocks(&self) -> u64 {
            (self.data.len() / BLOCK_SIZE) as u64
        }

        pub fn slice(&self, lba: u64, n_blocks: u32) -> &[u8] {
            let start = lba as usize * BLOCK_SIZE;
            let end = start + n_blocks as usize * BLOCK_SIZE;
            &self.data[start..end]
        }

        pub fn slice_mut(&mut self, lba: u64, n_blocks: u32) -> &mut [u8] {
            let start = lba as usize * BLOCK_SIZE;
            let end = start + n_blocks as usize * BLOCK_SIZE;
            &mut self.data[start..end]
        }
    }
}

impl InMemoryBlockDevice {
    /// Wrap a caller-owned, block-size-aligned byte buffer as a block device.
    pub fn new(backing: &'static mut [u8]) -> Self {
        Self {
            blocks: alloc_free::Storage::new(backing),
            cursor: 0,
        }
    }

    fn check_range(&self, lba: u64, n_blocks: u32) -> Result<()> {
        if lba + u64::from(n_blocks) > self.blocks.total_blocks() {
            return Err(Error::SeekOutOfRange);
        }
        Ok(())
    }
}

impl BlockDevice for InMemoryBlockDevice {
    fn seek(&mut self, offset_in_blocks: u64) -> Result<()> {
        self.check_range(offset_in_blocks, 0)?;
        self.cursor = offset_in_blocks;
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [u8], block_lba: u64, n_blocks: u32) -> Result<u32> {
        self.check_range(block_lba, n_blocks)?;
        let src = self.blocks.slice(block_lba, n_blocks);
        buf[..src.len()].copy_from_slice(src);
        Ok(n_blocks)
    }

    fn read_current(&mut self, buf: &mut [u8], n_blocks: u32) -> Result<u32> {
        let cursor = self.cursor;
        let n = self.read_block(buf, cursor, n_blocks)?;
        self.cursor += u64::from(n_blocks);
        Ok(n)
    }

    fn write_block(&mut self, buf: &[u8], block_lba: u64, n_blocks: u32) -> Result<u32> {
        self.check_range(block_lba, n_blocks)?;
        let dst = self.blocks.slice_mut(block_lba, n_blocks);
        dst.copy_from_slice(&buf[..dst.len()]);
        Ok(n_blocks)
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    static mut BACKING: [u8; BLOCK_SIZE * 4] = [0u8; BLOCK_SIZE * 4];

    #[test_case]
    fn write_then_read_round_trips() {
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);

        let mut write_buf = [0xABu8; BLOCK_SIZE];
        dev.write_block(&write_buf, 2, 1).unwrap();

        let mut read_buf = [0u8; BLOCK_SIZE];
        dev.read_block(&mut read_buf, 2, 1).unwrap();

        write_buf[0] = 0xAB;
        assert_eq!(read_buf, write_buf);
    }

    #[test_case]
    fn read_current_advances_cursor() {
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);

        dev.seek(1).unwrap();
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_current(&mut buf, 1).unwrap();
        dev.read_current(&mut buf, 1).unwrap();

        assert!(dev.check_range(3, 0).is_ok());
    }

    #[test_case]
    fn out_of_range_access_is_rejected() {
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);
        let mut buf = [0u8; BLOCK_SIZE];

        assert!(dev.read_block(&mut buf, 10, 1).is_err());
    }
}
