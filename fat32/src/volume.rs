// SPDX-License-Identifier: BlueOak-1.0.0

//! BIOS Parameter Block parsing and volume mount.

use crate::error::{self, Result};
use machine::devices::block::{BlockDevice, BLOCK_SIZE};

const BOOT_SIGNATURE_OFFSET: usize = 510;
const BOOT_SIGNATURE: u16 = 0xAA55;

const FS_INFO_LEAD_SIGNATURE: u32 = 0x4161_5252;
const FS_INFO_STRUCT_SIGNATURE: u32 = 0x6141_7272;
const FS_INFO_TRAIL_SIGNATURE: u32 = 0xAA55_0000;

/// End-of-chain and free/bad markers, masked to the low 28 bits that actually
/// carry the cluster link (bits 28-31 are reserved).
pub const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
pub const FAT_FREE_CLUSTER: u32 = 0;
pub const FAT_BAD_CLUSTER: u32 = 0x0FFF_FFF7;
pub const FAT_END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// A mounted FAT32 volume's static geometry, parsed once from the BPB.
#[derive(Debug, Copy, Clone)]
pub struct Volume {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
    pub fs_info_sector: u32,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub is_boot: bool,

    /// LBA of the start of this volume on the underlying device (0 if the
    /// device has no MBR and the BPB occupies sector 0 directly).
    pub partition_start_lba: u64,

    /// Free-cluster hint from FSInfo; recomputed lazily on first write.
    pub free_cluster_hint: u32,
}

impl Volume {
    pub fn bytes_per_cluster(&self) -> u32 {
        self.sectors_per_cluster * self.bytes_per_sector
    }

    pub fn fat_start_lba(&self) -> u64 {
        self.partition_start_lba + u64::from(self.reserved_sectors)
    }

    pub fn data_start_lba(&self) -> u64 {
        self.fat_start_lba() + u64::from(self.num_fats) * u64::from(self.sectors_per_fat)
    }

    /// First LBA, relative to the device, of cluster `cluster` (cluster
    /// numbers start at 2).
    pub fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.data_start_lba() + u64::from(cluster - 2) * u64::from(self.sectors_per_cluster)
    }

    fn parse_bpb(sector: &[u8], partition_start_lba: u64) -> Result<Volume> {
        if read_u16(sector, BOOT_SIGNATURE_OFFSET) != BOOT_SIGNATURE {
            return error::NotFat32Snafu.fail();
        }

        let bytes_per_sector = u32::from(read_u16(sector, 0x0B));
        if !matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return error::BadBytesPerSectorSnafu {
                value: bytes_per_sector,
            }
            .fail();
        }

        let sectors_per_cluster = u32::from(sector[0x0D]);
        if !matches!(sectors_per_cluster, 1 | 2 | 4 | 8 | 16 | 32 | 64 | 128) {
            return error::BadSectorsPerClusterSnafu {
                value: sectors_per_cluster,
            }
            .fail();
        }

        let num_fats = u32::from(sector[0x10]);
        if num_fats < 1 {
            return error::BadNumFatsSnafu.fail();
        }

        let sectors_per_fat = read_u32(sector, 0x24);
        if sectors_per_fat == 0 {
            return error::BadSectorsPerFatSnafu.fail();
        }

        let root_cluster = read_u32(sector, 0x2C);
        if root_cluster < 2 {
            return error::BadRootClusterSnafu.fail();
        }

        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&sector[0x47..0x52]);

        Ok(Volume {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors: u32::from(read_u16(sector, 0x0E)),
            num_fats,
            sectors_per_fat,
            root_cluster,
            fs_info_sector: u32::from(read_u16(sector, 0x30)),
            volume_id: read_u32(sector, 0x43),
            volume_label,
            is_boot: sector[0x42] == 0x29,
            partition_start_lba,
            free_cluster_hint: 2,
        })
    }

    fn read_fs_info_hint<D: BlockDevice>(&mut self, dev: &mut D) -> Result<()> {
        if self.fs_info_sector == 0 || self.fs_info_sector == 0xFFFF {
            return Ok(());
        }

        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(
            &mut buf,
            self.partition_start_lba + u64::from(self.fs_info_sector),
            1,
        )
        .map_err(|_| error::Error::Device)?;

        if read_u32(&buf, 0) == FS_INFO_LEAD_SIGNATURE
            && read_u32(&buf, 484) == FS_INFO_STRUCT_SIGNATURE
            && read_u32(&buf, 508) == FS_INFO_TRAIL_SIGNATURE
        {
            let hint = read_u32(&buf, 492);
            if hint != 0xFFFF_FFFF {
                self.free_cluster_hint = hint.max(2);
            }
        }

        Ok(())
    }

    /// Mount the volume found on `dev`. Tries the MBR path first; falls back
    /// to treating LBA 0 as the BPB directly.
    pub fn mount<D: BlockDevice>(dev: &mut D) -> Result<Volume> {
        let mut sector = [0u8; BLOCK_SIZE];
        dev.read_block(&mut sector, 0, 1)
            .map_err(|_| error::Error::Device)?;

        if read_u16(&sector, BOOT_SIGNATURE_OFFSET) != BOOT_SIGNATURE {
            return error::NotFat32Snafu.fail();
        }

        if let Ok(mut volume) = Self::parse_bpb(&sector, 0) {
            volume.read_fs_info_hint(dev)?;
            return Ok(volume);
        }

        for entry in 0..4 {
            let offset = 0x1BE + entry * 16;
            let partition_type = sector[offset + 4];
            if !matches!(partition_type, 0x0B | 0x0C) {
                continue;
            }

            let lba_start = u64::from(read_u32(&sector, offset + 8));
            let mut part_sector = [0u8; BLOCK_SIZE];
            if dev.read_block(&mut part_sector, lba_start, 1).is_err() {
                continue;
            }

            if let Ok(mut volume) = Self::parse_bpb(&part_sector, lba_start) {
                volume.read_fs_info_hint(dev)?;
                return Ok(volume);
            }
        }

        error::NoSupportedPartitionSnafu.fail()
    }
}
