/*
 * SPDX-License-Identifier: MIT OR BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! The BCM2837/BCM2711 EMMC (SD-host) controller: card init state machine and
//! 512-byte block read/write transfer.

use crate::{
    devices::block::{self, BlockDevice},
    memory::{Address, Virtual},
    platform::device_driver::common::MMIODerefWrapper,
    synchronization::{interface::Mutex, IRQSafeNullLock},
    time,
};
use core::time::Duration;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

register_bitfields! {
    u32,

    CONTROL1 [
        SRST_DATA OFFSET(26) NUMBITS(1) [],
        SRST_CMD  OFFSET(25) NUMBITS(1) [],
        SRST_HC   OFFSET(24) NUMBITS(1) [],
        CLK_FREQ8 OFFSET(8) NUMBITS(8) [],
        CLK_FREQ_MS2 OFFSET(6) NUMBITS(2) [],
        CLK_GENSEL OFFSET(5) NUMBITS(1) [],
        CLK_EN OFFSET(2) NUMBITS(1) [],
        CLK_STABLE OFFSET(1) NUMBITS(1) [],
        CLK_INTLEN OFFSET(0) NUMBITS(1) [],
    ],

    STATUS [
        DAT_INHIBIT OFFSET(1) NUMBITS(1) [],
        CMD_INHIBIT OFFSET(0) NUMBITS(1) [],
    ],
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => ARG2: ReadWrite<u32>),
        (0x04 => BLKSIZECNT: ReadWrite<u32>),
        (0x08 => ARG1: ReadWrite<u32>),
        (0x0c => CMDTM: ReadWrite<u32>),
        (0x10 => RESP: [ReadOnly<u32>; 4]),
        (0x20 => DATA: ReadWrite<u32>),
        (0x24 => STATUS: ReadOnly<u32, STATUS::Register>),
        (0x28 => CONTROL0: ReadWrite<u32>),
        (0x2c => CONTROL1: ReadWrite<u32, CONTROL1::Register>),
        (0x30 => INTERRUPT: ReadWrite<u32>),
        (0x34 => IRPT_MASK: ReadWrite<u32>),
        (0x38 => IRPT_EN: ReadWrite<u32>),
        (0x3c => CONTROL2: ReadWrite<u32>),
        (0x40 => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

/// Interrupt-flag bits: lower 16 are status conditions, upper 16 are sticky errors.
const INT_CMD_DONE: u32 = 1 << 0;
const INT_DATA_DONE: u32 = 1 << 1;
const INT_WRITE_READY: u32 = 1 << 4;
const INT_READ_READY: u32 = 1 << 5;
const INT_ERROR_MASK: u32 = 0xffff_0000;

/// Ack mask written after an ordinary command: every error bit plus `command_done`,
/// never `data_done` (§4.5 tie-breaks).
const ACK_AFTER_COMMAND: u32 = INT_ERROR_MASK | INT_CMD_DONE;

const SD_CLOCK_SETUP_HZ: u32 = 400_000;
const SD_CLOCK_NORMAL_HZ: u32 = 25_000_000;

/// Both boards map the EMMC (SD host) controller at the same offset within the
/// peripheral block.
pub const EMMC_BASE: usize = crate::platform::BcmHost::get_peripheral_address() + 0x0030_0000;

/// EMMC base clock as reported by the firmware's mailbox `GET_CLOCK_RATE` tag for
/// clock id 1 (EMMC) on both boards under the VPU's default configuration.
const EMMC_BASE_CLOCK_HZ: u32 = 41_666_666;

const CMD_GO_IDLE: u32 = 0;
const CMD_SEND_CID: u32 = 2;
const CMD_SEND_RELATIVE_ADDR: u32 = 3;
const CMD_SELECT_CARD: u32 = 7;
const CMD_SEND_IF_COND: u32 = 8;
const CMD_SET_BLOCKLEN: u32 = 16;
const CMD_READ_SINGLE: u32 = 17;
const CMD_READ_MULTIPLE: u32 = 18;
const CMD_WRITE_SINGLE: u32 = 24;
const CMD_WRITE_MULTIPLE: u32 = 25;
const CMD_APP_OCR_CHECK: u32 = 41;
const CMD_SEND_SCR: u32 = 51;
const CMD_APP: u32 = 55;

/// Encodes a command into `CMDTM`: index, response-type, and data-direction bits.
/// `RSPNS_TYPE` occupies bits 16-17, `ISDATA` bit 21, `TM_DAT_DIR` bit 4 (1 = read).
fn cmdtm(index: u32, response_48_bits: bool, response_136_bits: bool, is_data: bool, is_read: bool, multiblock: bool) -> u32 {
    let mut v = index << 24;
    if response_136_bits {
        v |= 1 << 16;
    } else if response_48_bits {
        v |= 2 << 16;
    }
    if is_data {
        v |= 1 << 21;
        if is_read {
            v |= 1 << 4;
        }
        if multiblock {
            v |= (1 << 5) | (1 << 1); // MULTI_BLOCK | BLKCNT_EN
        }
    }
    v
}

struct Scr {
    bus_widths: u32,
    version: u32,
}

struct EmmcInner {
    registers: Registers,
    initialized: bool,
    is_sdhc: bool,
    rca: u32,
    scr: Option<Scr>,
    offset_blocks: u64,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// The BCM EMMC block driver.
pub struct Emmc {
    inner: IRQSafeNullLock<EmmcInner>,
}

//--------------------------------------------------------------------------------------------------
// Private code
//--------------------------------------------------------------------------------------------------

impl EmmcInner {
    /// Smallest power-of-two divider with `base / divider <= target`, capped at 1024.
    fn clock_divider(base_hz: u32, target_hz: u32) -> u32 {
        let mut integral = if target_hz > base_hz {
            1
        } else {
            let mut d = base_hz / target_hz;
            if base_hz % target_hz != 0 {
                d += 1;
            }
            d
        };
        if integral > 1024 {
            integral = 1024;
        }

        let mut pow2 = 1u32;
        while pow2 < integral {
            pow2 *= 2;
        }
        pow2
    }

    fn wait_while<F: Fn(&Self) -> bool>(&self, timeout: Duration, cond: F) -> block::Result<()> {
        let deadline = time::time_manager().uptime() + timeout;
        while cond(self) {
            if time::time_manager().uptime() > deadline {
                return Err(block::Error::CommandTimeout);
            }
            core::hint::spin_loop();
        }
        Ok(())
    }

    fn wait_for_inhibit_clear(&self) -> block::Result<()> {
        self.wait_while(Duration::from_millis(500), |s| {
            s.registers
                .STATUS
                .extract()
                .matches_any(STATUS::CMD_INHIBIT::SET + STATUS::DAT_INHIBIT::SET)
        })
        .map_err(|_| block::Error::InhibitTimeout)
    }

    fn reset_command_line(&self) {
        self.registers.CONTROL1.modify(CONTROL1::SRST_CMD::SET);
        let _ = self.wait_while(Duration::from_millis(100), |s| {
            s.registers.CONTROL1.is_set(CONTROL1::SRST_CMD)
        });
    }

    /// Issue a command, wait for completion, and ack `ACK_AFTER_COMMAND`. `last_response`
    /// is left in `RESP[0..4]` for the caller to inspect.
    fn command(&self, cmdtm_value: u32, arg: u32) -> block::Result<()> {
        self.wait_for_inhibit_clear()?;

        self.registers.INTERRUPT.set(0xffff_ffff);
        self.registers.ARG1.set(arg);
        self.registers.CMDTM.set(cmdtm_value);

        let result = self.wait_while(Duration::from_millis(500), |s| {
            s.registers.INTERRUPT.get() & (INT_CMD_DONE | INT_ERROR_MASK) == 0
        });

        let flags = self.registers.INTERRUPT.get();
        self.registers.INTERRUPT.set(ACK_AFTER_COMMAND & flags | (flags & INT_ERROR_MASK));

        if result.is_err() || flags & INT_ERROR_MASK != 0 {
            self.reset_command_line();
            return Err(block::Error::CommandTimeout);
        }

        Ok(())
    }

    fn app_command(&self, cmdtm_value: u32, arg: u32) -> block::Result<()> {
        self.command(cmdtm(CMD_APP, true, false, false, false, false), self.rca)?;
        self.command(cmdtm_value, arg)
    }

    fn set_clock(&self, target_hz: u32) -> block::Result<()> {
        self.registers.CONTROL1.modify(CONTROL1::CLK_EN::CLEAR);

        let divider = Self::clock_divider(EMMC_BASE_CLOCK_HZ, target_hz);
        let lo = divider & 0xff;
        let hi = (divider & 0x300) >> 8;
        self.registers.CONTROL1.write(
            CONTROL1::CLK_FREQ8.val(lo) + CONTROL1::CLK_FREQ_MS2.val(hi) + CONTROL1::CLK_INTLEN::SET,
        );

        self.wait_while(Duration::from_millis(500), |s| {
            !s.registers.CONTROL1.is_set(CONTROL1::CLK_STABLE)
        })
        .map_err(|_| block::Error::ClockNotStable)?;

        self.registers.CONTROL1.modify(CONTROL1::CLK_EN::SET);
        Ok(())
    }

    /// The full card init state machine (§4.5).
    fn initialize(&mut self) -> block::Result<()> {
        self.registers.CONTROL1.write(
            CONTROL1::SRST_HC::SET + CONTROL1::SRST_CMD::SET + CONTROL1::SRST_DATA::SET,
        );
        self.wait_while(Duration::from_millis(500), |s| {
            s.registers.CONTROL1.get() & 0x0700_0000 != 0
        })
        .map_err(|_| block::Error::CommandTimeout)?;

        self.set_clock(SD_CLOCK_SETUP_HZ)?;
        self.registers.IRPT_EN.set(0);
        self.registers.IRPT_MASK.set(0xffff_ffff);

        self.command(cmdtm(CMD_GO_IDLE, false, false, false, false, false), 0)?;

        let is_v2 = self
            .command(cmdtm(CMD_SEND_IF_COND, true, false, false, false, false), 0x1aa)
            .is_ok();

        let hcs_bit = if is_v2 { 1 << 30 } else { 0 };
        let mut ocr = 0u32;
        for _ in 0..1000u32 {
            self.app_command(
                cmdtm(CMD_APP_OCR_CHECK, true, false, false, false, false),
                0x00ff_8000 | hcs_bit,
            )?;
            ocr = self.registers.RESP[0].get();
            if ocr & (1 << 31) != 0 {
                break;
            }
        }
        if ocr & (1 << 31) == 0 {
            return Err(block::Error::SdhcProbeTimeout);
        }
        self.is_sdhc = ocr & (1 << 30) != 0;

        self.set_clock(SD_CLOCK_NORMAL_HZ)?;

        self.command(cmdtm(CMD_SEND_CID, false, true, false, false, false), 0)?;
        self.command(cmdtm(CMD_SEND_RELATIVE_ADDR, true, false, false, false, false), 0)?;
        self.rca = self.registers.RESP[0].get() & 0xffff_0000;

        self.command(cmdtm(CMD_SELECT_CARD, true, false, false, false, false), self.rca)?;
        let status = (self.registers.RESP[0].get() >> 9) & 0xf;
        if status != 3 && status != 4 {
            return Err(block::Error::SelectCardBad);
        }

        if !self.is_sdhc {
            self.command(cmdtm(CMD_SET_BLOCKLEN, true, false, false, false, false), 512)
                .map_err(|_| block::Error::SetBlockLenFailed)?;
        }

        self.registers.BLKSIZECNT.set(8);
        self.app_command(cmdtm(CMD_SEND_SCR, true, false, true, true, false), 0)
            .map_err(|_| block::Error::SendScrFailed)?;
        let scr0 = self.registers.DATA.get();
        self.scr = Some(Scr {
            bus_widths: (scr0 >> 16) & 0xf,
            version: (scr0 >> 12) & 0xf,
        });

        self.registers.IRPT_EN.set(0xffff_ffff & !(1 << 8));
        self.initialized = true;
        Ok(())
    }

    fn transfer(&self, buf: &mut [u8], block_lba: u64, n_blocks: u32, write: bool) -> block::Result<u32> {
        if !self.initialized {
            return Err(block::Error::InvalidCommand);
        }

        let addr = if self.is_sdhc {
            block_lba as u32
        } else {
            (block_lba * 512) as u32
        };

        let mut last_err = block::Error::TransferDataFailed;
        for _attempt in 0..3 {
            self.registers.BLKSIZECNT.set((n_blocks << 16) | 512);

            let cmd_index = match (write, n_blocks > 1) {
                (false, false) => CMD_READ_SINGLE,
                (false, true) => CMD_READ_MULTIPLE,
                (true, false) => CMD_WRITE_SINGLE,
                (true, true) => CMD_WRITE_MULTIPLE,
            };
            let command_value = cmdtm(cmd_index, true, false, true, !write, n_blocks > 1);

            if self.command(command_value, addr).is_err() {
                last_err = block::Error::CommandTimeout;
                continue;
            }

            let ready_bit = if write { INT_WRITE_READY } else { INT_READ_READY };
            let mut ok = true;
            for block_idx in 0..n_blocks as usize {
                if self
                    .wait_while(Duration::from_millis(500), |s| {
                        s.registers.INTERRUPT.get() & (ready_bit | INT_ERROR_MASK) == 0
                    })
                    .is_err()
                {
                    ok = false;
                    break;
                }
                self.registers.INTERRUPT.set(ready_bit);

                let base = block_idx * 512;
                for word in 0..128 {
                    let off = base + word * 4;
                    if write {
                        let w = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
                        self.registers.DATA.set(w);
                    } else {
                        let w = self.registers.DATA.get();
                        buf[off..off + 4].copy_from_slice(&w.to_le_bytes());
                    }
                }
            }

            if !ok {
                last_err = block::Error::TransferDataFailed;
                continue;
            }

            if self
                .wait_while(Duration::from_millis(500), |s| {
                    s.registers.INTERRUPT.get() & (INT_DATA_DONE | INT_ERROR_MASK) == 0
                })
                .is_err()
            {
                last_err = block::Error::TransferDataFailed;
                continue;
            }
            self.registers.INTERRUPT.set(INT_DATA_DONE | INT_ERROR_MASK);

            return Ok(n_blocks);
        }

        Err(if write {
            block::Error::WriteMaxRetries
        } else {
            last_err
        })
    }
}

impl Emmc {
    /// # Safety
    ///
    /// - `mmio_base_addr` must be the EMMC controller's real MMIO base address.
    pub const unsafe fn new(mmio_base_addr: Address<Virtual>) -> Self {
        Self {
            inner: IRQSafeNullLock::new(EmmcInner {
                registers: Registers::new(mmio_base_addr),
                initialized: false,
                is_sdhc: false,
                rca: 0,
                scr: None,
                offset_blocks: 0,
            }),
        }
    }

    /// Run the card-init state machine (§4.5). Idempotent.
    pub fn initialize(&self) -> block::Result<()> {
        self.inner.lock(|inner| {
            if inner.initialized {
                return Ok(());
            }
            inner.initialize()
        })
    }

    /// Whether the attached card reported itself as SDHC/SDXC.
    pub fn is_sdhc(&self) -> bool {
        self.inner.lock(|inner| inner.is_sdhc)
    }
}

impl BlockDevice for Emmc {
    fn seek(&mut self, offset_in_blocks: u64) -> block::Result<()> {
        self.inner.lock(|inner| inner.offset_blocks = offset_in_blocks);
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [u8], block_lba: u64, n_blocks: u32) -> block::Result<u32> {
        self.inner.lock(|inner| inner.transfer(buf, block_lba, n_blocks, false))
    }

    fn read_current(&mut self, buf: &mut [u8], n_blocks: u32) -> block::Result<u32> {
        let lba = self.inner.lock(|inner| inner.offset_blocks);
        let n = self.read_block(buf, lba, n_blocks)?;
        self.inner.lock(|inner| inner.offset_blocks += u64::from(n_blocks));
        Ok(n)
    }

    fn write_block(&mut self, buf: &[u8], block_lba: u64, n_blocks: u32) -> block::Result<u32> {
        // `transfer` takes `&mut [u8]` for the read path; writes never mutate the
        // buffer, so a local scratch copy is unnecessary beyond satisfying the API.
        const SCRATCH_BLOCKS: usize = 8;
        let mut scratch = [0u8; 512 * SCRATCH_BLOCKS];
        let needed = n_blocks as usize * 512;
        if needed > scratch.len() || buf.len() < needed {
            return Err(block::Error::TransferTooLarge);
        }
        scratch[..needed].copy_from_slice(&buf[..needed]);
        self.inner
            .lock(|inner| inner.transfer(&mut scratch[..needed], block_lba, n_blocks, true))
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

impl crate::drivers::interface::DeviceDriver for Emmc {
    type IRQNumberType = crate::platform::device_driver::IRQNumber;

    fn compatible(&self) -> &'static str {
        "BCM EMMC"
    }

    unsafe fn init(&self) -> Result<(), &'static str> {
        self.initialize().map_err(|_| "EMMC card init failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn clock_divider_is_power_of_two_and_capped() {
        assert_eq!(EmmcInner::clock_divider(50_000_000, 400_000), 128);
        assert_eq!(EmmcInner::clock_divider(50_000_000, 25_000_000), 2);
        assert_eq!(EmmcInner::clock_divider(400_000_000, 1), 1024);
    }
}
