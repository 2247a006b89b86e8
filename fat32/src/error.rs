// SPDX-License-Identifier: BlueOak-1.0.0

//! Error taxonomy for volume mount, cluster-chain management and directory
//! operations.

use snafu::Snafu;

#[derive(Debug, Snafu, Copy, Clone, Eq, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("block device read/write failed"))]
    Device,

    #[snafu(display("not a valid MBR or BPB sector"))]
    NotFat32,

    #[snafu(display("unsupported bytes_per_sector {value}"))]
    BadBytesPerSector { value: u32 },

    #[snafu(display("unsupported sectors_per_cluster {value}"))]
    BadSectorsPerCluster { value: u32 },

    #[snafu(display("num_fats must be >= 1"))]
    BadNumFats,

    #[snafu(display("sectors_per_fat must be > 0"))]
    BadSectorsPerFat,

    #[snafu(display("root_cluster must be >= 2"))]
    BadRootCluster,

    #[snafu(display("no partition on this disk is a supported FAT32 volume"))]
    NoSupportedPartition,

    #[snafu(display("cluster number out of range"))]
    InvalidCluster,

    #[snafu(display("no free cluster available"))]
    OutOfSpace,

    #[snafu(display("path segment longer than 255 bytes"))]
    SegmentTooLong,

    #[snafu(display("path longer than 4096 bytes"))]
    PathTooLong,

    #[snafu(display("path component not found"))]
    NotFound,

    #[snafu(display("path component is not a directory"))]
    NotADirectory,

    #[snafu(display("path component is a directory, not a file"))]
    IsADirectory,

    #[snafu(display("directory is full and no more slots can be allocated"))]
    DirectoryFull,

    #[snafu(display("name already exists in directory"))]
    AlreadyExists,
}

pub type Result<T> = core::result::Result<T, Error>;
