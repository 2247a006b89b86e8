// SPDX-License-Identifier: BlueOak-1.0.0

//! File operations (C6): open, cross-cluster read, append, delete and
//! rename, built on the directory-entry and FAT primitives in
//! [`crate::directory`] and [`crate::fat_table`].

use crate::{
    directory::{self, attrs, EntryAddress, EntryType},
    error::{self, Result},
    fat_table::{self, ChainFollower},
    volume::Volume,
};
use machine::devices::block::{BlockDevice, BLOCK_SIZE};

/// How a file is opened. `Create` fails if the name already exists;
/// `ReadWriteAppend` creates the file if it's missing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpenMode {
    Read,
    ReadWrite,
    ReadWriteAppend,
    Create,
}

/// An open file: its directory-entry location plus a read/append cursor.
pub struct File {
    parent_cluster: u32,
    first_cluster: u32,
    size: u32,
    offset: u32,
    attrs: u8,
    short_name: [u8; 11],
    address: EntryAddress,
}

impl File {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    /// Opens `name` inside the directory rooted at `parent_cluster`. `Create`
    /// and `ReadWriteAppend` both create the file if it doesn't already
    /// exist; every other mode fails with `not-found`.
    pub fn open<D: BlockDevice>(
        dev: &mut D,
        volume: &mut Volume,
        parent_cluster: u32,
        name: &str,
        mode: OpenMode,
    ) -> Result<Self> {
        let existing = directory::find_entry(dev, volume, parent_cluster, name)?;

        let entry = match existing {
            Some(entry) => {
                if entry.entry_type != EntryType::File {
                    return error::IsADirectorySnafu.fail();
                }
                entry
            }
            None if mode == OpenMode::Create || mode == OpenMode::ReadWriteAppend => {
                create_entry(dev, volume, parent_cluster, name, attrs::ARCHIVE, 0, 0)?;
                directory::find_entry(dev, volume, parent_cluster, name)?
                    .ok_or(error::Error::NotFound)?
            }
            None => return error::NotFoundSnafu.fail(),
        };

        let offset = if mode == OpenMode::ReadWriteAppend {
            entry.size
        } else {
            0
        };

        Ok(Self {
            parent_cluster,
            first_cluster: entry.first_cluster,
            size: entry.size,
            offset,
            attrs: entry.attrs,
            short_name: entry.short_name,
            address: entry.address,
        })
    }

    /// Reads from the current offset, crossing cluster boundaries as needed.
    /// Returns the number of bytes actually read, which is short at EOF.
    pub fn read<D: BlockDevice>(&mut self, dev: &mut D, volume: &Volume, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.offset >= self.size {
            return Ok(0);
        }

        let cluster_size = volume.bytes_per_cluster();
        let want = buf.len().min((self.size - self.offset) as usize);

        let mut cluster = self.locate_cluster(dev, volume, self.offset / cluster_size)?;
        let mut offset_in_cluster = (self.offset % cluster_size) as usize;

        let mut read_total = 0usize;
        while read_total < want {
            let lba = volume.cluster_to_lba(cluster);
            let sector_index = (offset_in_cluster / BLOCK_SIZE) as u64;
            let offset_in_sector = offset_in_cluster % BLOCK_SIZE;

            let mut sector = [0u8; BLOCK_SIZE];
            dev.read_block(&mut sector, lba + sector_index, 1)
                .map_err(|_| error::Error::Device)?;

            let take = (BLOCK_SIZE - offset_in_sector).min(want - read_total);
            buf[read_total..read_total + take]
                .copy_from_slice(&sector[offset_in_sector..offset_in_sector + take]);

            read_total += take;
            offset_in_cluster += take;

            if offset_in_cluster >= cluster_size as usize && read_total < want {
                cluster = self.next_cluster(dev, volume, cluster)?;
                offset_in_cluster = 0;
            }
        }

        self.offset += read_total as u32;
        Ok(read_total)
    }

    /// Writes `data` into the last partial cluster, allocating new clusters
    /// as needed, and updates the stored size in the short entry.
    pub fn append<D: BlockDevice>(&mut self, dev: &mut D, volume: &mut Volume, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let cluster_size = volume.bytes_per_cluster();
        if self.first_cluster == 0 {
            self.first_cluster = fat_table::allocate_cluster(dev, volume, None)?;
        }

        let mut cluster = self.first_cluster;
        for _ in 0..(self.size / cluster_size) {
            cluster = match Self::advance(dev, volume, cluster)? {
                Some(next) => next,
                None => fat_table::allocate_cluster(dev, volume, Some(cluster))?,
            };
        }
        let mut offset_in_cluster = (self.size % cluster_size) as usize;

        let mut written = 0usize;
        while written < data.len() {
            let lba = volume.cluster_to_lba(cluster);
            let sector_index = (offset_in_cluster / BLOCK_SIZE) as u64;
            let offset_in_sector = offset_in_cluster % BLOCK_SIZE;

            let mut sector = [0u8; BLOCK_SIZE];
            dev.read_block(&mut sector, lba + sector_index, 1)
                .map_err(|_| error::Error::Device)?;

            let take = (BLOCK_SIZE - offset_in_sector).min(data.len() - written);
            sector[offset_in_sector..offset_in_sector + take]
                .copy_from_slice(&data[written..written + take]);
            dev.write_block(&sector, lba + sector_index, 1)
                .map_err(|_| error::Error::Device)?;

            written += take;
            offset_in_cluster += take;
            self.size += take as u32;

            if offset_in_cluster >= cluster_size as usize && written < data.len() {
                cluster = fat_table::allocate_cluster(dev, volume, Some(cluster))?;
                offset_in_cluster = 0;
            }
        }

        self.offset = self.size;
        self.rewrite_directory_entry(dev, volume)
    }

    fn locate_cluster<D: BlockDevice>(&self, dev: &mut D, volume: &Volume, hops: u32) -> Result<u32> {
        let mut cluster = self.first_cluster;
        for _ in 0..hops {
            cluster = Self::advance(dev, volume, cluster)?.ok_or(error::Error::InvalidCluster)?;
        }
        Ok(cluster)
    }

    fn next_cluster<D: BlockDevice>(&self, dev: &mut D, volume: &Volume, cluster: u32) -> Result<u32> {
        Self::advance(dev, volume, cluster)?.ok_or(error::Error::InvalidCluster)
    }

    fn advance<D: BlockDevice>(dev: &mut D, volume: &Volume, cluster: u32) -> Result<Option<u32>> {
        let mut follower = ChainFollower::new(cluster);
        follower.next(dev, volume)?;
        follower.next(dev, volume)
    }

    fn rewrite_directory_entry<D: BlockDevice>(&self, dev: &mut D, volume: &Volume) -> Result<()> {
        let bytes = directory::format_short_entry(&self.short_name, self.attrs, self.first_cluster, self.size);
        directory::write_slot(dev, volume, self.address, &bytes)
    }
}

/// Writes a short entry (and, if `long_addresses` is non-empty, the
/// preceding long-name chain) for `name`. `long_addresses` must be physically
/// contiguous and immediately precede `short_address` in the directory.
fn write_name_entries<D: BlockDevice>(
    dev: &mut D,
    volume: &Volume,
    long_addresses: &[EntryAddress],
    short_address: EntryAddress,
    name: &str,
    short_name: [u8; 11],
    attr_byte: u8,
    first_cluster: u32,
    size: u32,
) -> Result<()> {
    let checksum = directory::short_name_checksum(&short_name);
    let total_long = long_addresses.len();

    if total_long > 0 {
        let mut units = [0u16; 255];
        let len = directory::utf16_units(name, &mut units);

        for (i, &addr) in long_addresses.iter().enumerate() {
            let ordinal = (total_long - i) as u8;
            let is_last = i == 0;
            let chunk_start = (ordinal as usize - 1) * 13;

            let mut chunk = [0xFFFFu16; 13];
            for (k, slot) in chunk.iter_mut().enumerate() {
                let pos = chunk_start + k;
                if pos < len {
                    *slot = units[pos];
                } else if pos == len {
                    *slot = 0x0000;
                }
            }

            let bytes = directory::format_long_slot(ordinal, is_last, checksum, &chunk);
            directory::write_slot(dev, volume, addr, &bytes)?;
        }
    }

    let short_bytes = directory::format_short_entry(&short_name, attr_byte, first_cluster, size);
    directory::write_slot(dev, volume, short_address, &short_bytes)
}

fn short_name_for<D: BlockDevice>(
    dev: &mut D,
    volume: &Volume,
    parent_cluster: u32,
    name: &str,
) -> ([u8; 11], usize) {
    match directory::exact_short_form(name) {
        Some(short) => (short, 0),
        None => {
            let dev_ref = &mut *dev;
            let volume_ref = &*volume;
            let short = directory::generate_short_name(name, move |candidate| {
                directory::short_name_taken(&mut *dev_ref, volume_ref, parent_cluster, candidate)
            });
            let mut units = [0u16; 255];
            let len = directory::utf16_units(name, &mut units);
            (short, directory::long_name_slot_count(len))
        }
    }
}

/// Creates a new directory entry named `name` with the given attributes,
/// first cluster and size. Fails with `already-exists` if the name is taken.
fn create_entry<D: BlockDevice>(
    dev: &mut D,
    volume: &mut Volume,
    parent_cluster: u32,
    name: &str,
    attr_byte: u8,
    first_cluster: u32,
    size: u32,
) -> Result<EntryAddress> {
    if directory::find_entry(dev, volume, parent_cluster, name)?.is_some() {
        return error::AlreadyExistsSnafu.fail();
    }

    let (short_name, long_count) = short_name_for(dev, volume, parent_cluster, name);
    let (addresses, got) = directory::reserve_entry_run(dev, volume, parent_cluster, long_count + 1)?;
    debug_assert_eq!(got, long_count + 1);

    let short_address = addresses[long_count];
    write_name_entries(
        dev,
        volume,
        &addresses[..long_count],
        short_address,
        name,
        short_name,
        attr_byte,
        first_cluster,
        size,
    )?;
    Ok(short_address)
}

/// Creates an empty file. Actual data arrives via [`File::append`].
pub fn create_file<D: BlockDevice>(dev: &mut D, volume: &mut Volume, parent_cluster: u32, name: &str) -> Result<()> {
    create_entry(dev, volume, parent_cluster, name, attrs::ARCHIVE, 0, 0).map(|_| ())
}

/// Creates a subdirectory: allocates its first cluster, then writes its
/// directory entry in the parent.
pub fn create_directory<D: BlockDevice>(
    dev: &mut D,
    volume: &mut Volume,
    parent_cluster: u32,
    name: &str,
) -> Result<u32> {
    if directory::find_entry(dev, volume, parent_cluster, name)?.is_some() {
        return error::AlreadyExistsSnafu.fail();
    }
    let new_cluster = fat_table::allocate_cluster(dev, volume, None)?;
    create_entry(dev, volume, parent_cluster, name, attrs::DIRECTORY, new_cluster, 0)?;
    Ok(new_cluster)
}

/// Marks `name`'s short entry and its long-name prefix deleted, and frees
/// its cluster chain.
pub fn delete<D: BlockDevice>(dev: &mut D, volume: &mut Volume, parent_cluster: u32, name: &str) -> Result<()> {
    let entry = directory::find_entry(dev, volume, parent_cluster, name)?.ok_or(error::Error::NotFound)?;

    for &addr in &entry.long_entry_addresses[..entry.long_entry_count] {
        directory::mark_deleted(dev, volume, addr)?;
    }
    directory::mark_deleted(dev, volume, entry.address)?;

    if entry.first_cluster != 0 {
        fat_table::free_chain(dev, volume, entry.first_cluster)?;
    }
    Ok(())
}

/// Rewrites `old`'s long/short entries as `new`, reusing the old slots in
/// place when the new name needs no more long entries than the old one, and
/// allocating a fresh run (then freeing the old one) otherwise.
pub fn rename<D: BlockDevice>(
    dev: &mut D,
    volume: &mut Volume,
    parent_cluster: u32,
    old: &str,
    new: &str,
) -> Result<()> {
    if old == new {
        return Ok(());
    }

    let entry = directory::find_entry(dev, volume, parent_cluster, old)?.ok_or(error::Error::NotFound)?;
    if directory::find_entry(dev, volume, parent_cluster, new)?.is_some() {
        return error::AlreadyExistsSnafu.fail();
    }

    let (new_short, new_long_count) = short_name_for(dev, volume, parent_cluster, new);
    let old_long_count = entry.long_entry_count;

    if new_long_count <= old_long_count {
        let unused = old_long_count - new_long_count;
        for &addr in &entry.long_entry_addresses[..unused] {
            directory::mark_deleted(dev, volume, addr)?;
        }
        let reused = &entry.long_entry_addresses[unused..old_long_count];
        write_name_entries(
            dev,
            volume,
            reused,
            entry.address,
            new,
            new_short,
            entry.attrs,
            entry.first_cluster,
            entry.size,
        )?;
    } else {
        let (addresses, got) = directory::reserve_entry_run(dev, volume, parent_cluster, new_long_count + 1)?;
        debug_assert_eq!(got, new_long_count + 1);
        let short_address = addresses[new_long_count];
        write_name_entries(
            dev,
            volume,
            &addresses[..new_long_count],
            short_address,
            new,
            new_short,
            entry.attrs,
            entry.first_cluster,
            entry.size,
        )?;

        for &addr in &entry.long_entry_addresses[..old_long_count] {
            directory::mark_deleted(dev, volume, addr)?;
        }
        directory::mark_deleted(dev, volume, entry.address)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;
    use machine::devices::block::InMemoryBlockDevice;

    fn test_volume(sectors_per_cluster: u32) -> Volume {
        Volume {
            bytes_per_sector: 512,
            sectors_per_cluster,
            reserved_sectors: 1,
            num_fats: 1,
            sectors_per_fat: 1,
            root_cluster: 2,
            fs_info_sector: 0,
            volume_id: 0,
            volume_label: [0u8; 11],
            is_boot: true,
            partition_start_lba: 0,
            free_cluster_hint: 2,
        }
    }

    // Reserves cluster 2 (the root directory) in the FAT so later allocations
    // never hand it back out, and zeroes it so it starts out as an empty,
    // all-`FREE_SLOT` directory.
    fn claim_root_cluster(dev: &mut InMemoryBlockDevice, volume: &mut Volume) {
        let claimed = fat_table::allocate_cluster(dev, volume, None).unwrap();
        assert_eq!(claimed, 2);
    }

    #[test]
    fn create_append_reopen_round_trips() {
        static mut BACKING: [u8; BLOCK_SIZE * 64] = [0u8; BLOCK_SIZE * 64];
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);
        let mut volume = test_volume(8);
        claim_root_cluster(&mut dev, &mut volume);

        let mut file = File::open(&mut dev, &mut volume, 2, "new.txt", OpenMode::Create).unwrap();
        file.append(&mut dev, &mut volume, b"hello\n").unwrap();
        assert_eq!(file.size(), 6);

        let mut reopened = File::open(&mut dev, &mut volume, 2, "new.txt", OpenMode::Read).unwrap();
        assert_eq!(reopened.size(), 6);
        let mut buf = [0u8; 6];
        let n = reopened.read(&mut dev, &volume, &mut buf).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buf, b"hello\n");
    }

    #[test]
    fn read_crosses_cluster_boundary() {
        // cluster size = 8 * 512 = 4096 bytes, matching the spec scenario.
        static mut BACKING: [u8; BLOCK_SIZE * 64] = [0u8; BLOCK_SIZE * 64];
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);
        let mut volume = test_volume(8);
        claim_root_cluster(&mut dev, &mut volume);

        create_file(&mut dev, &mut volume, 2, "big.txt").unwrap();
        let mut file = File::open(&mut dev, &mut volume, 2, "big.txt", OpenMode::ReadWriteAppend).unwrap();

        let mut remaining = 9000usize;
        let chunk = [b'x'; 4096];
        while remaining > 0 {
            let take = remaining.min(chunk.len());
            file.append(&mut dev, &mut volume, &chunk[..take]).unwrap();
            remaining -= take;
        }
        assert_eq!(file.size(), 9000);

        let mut reopened = File::open(&mut dev, &mut volume, 2, "big.txt", OpenMode::Read).unwrap();
        let mut buf = [0u8; 8192];
        let first = reopened.read(&mut dev, &volume, &mut buf).unwrap();
        assert_eq!(first, 8192);
        let second = reopened.read(&mut dev, &volume, &mut buf).unwrap();
        assert_eq!(second, 808);
    }

    #[test]
    fn long_filename_round_trips_to_spec_short_name() {
        static mut BACKING: [u8; BLOCK_SIZE * 64] = [0u8; BLOCK_SIZE * 64];
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);
        let mut volume = test_volume(8);
        claim_root_cluster(&mut dev, &mut volume);

        create_file(&mut dev, &mut volume, 2, "Lorem ipsum dolor sit amet.text").unwrap();

        let entry = directory::find_entry(&mut dev, &volume, 2, "Lorem ipsum dolor sit amet.text")
            .unwrap()
            .unwrap();
        let mut short_buf = [0u8; 13];
        let n = entry.short_name_display(&mut short_buf);
        assert_eq!(&short_buf[..n], b"LOREMI~1.TEX");

        let opened = File::open(&mut dev, &mut volume, 2, "Lorem ipsum dolor sit amet.text", OpenMode::Read);
        assert!(opened.is_ok());
    }

    #[test]
    fn delete_frees_chain_and_unlists_entry() {
        static mut BACKING: [u8; BLOCK_SIZE * 64] = [0u8; BLOCK_SIZE * 64];
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);
        let mut volume = test_volume(8);
        claim_root_cluster(&mut dev, &mut volume);

        create_file(&mut dev, &mut volume, 2, "gone.txt").unwrap();
        let mut file = File::open(&mut dev, &mut volume, 2, "gone.txt", OpenMode::ReadWriteAppend).unwrap();
        file.append(&mut dev, &mut volume, b"data").unwrap();

        delete(&mut dev, &mut volume, 2, "gone.txt").unwrap();
        assert!(directory::find_entry(&mut dev, &volume, 2, "gone.txt").unwrap().is_none());
    }

    #[test]
    fn rename_then_inverse_rename_is_findable_under_original_name() {
        static mut BACKING: [u8; BLOCK_SIZE * 64] = [0u8; BLOCK_SIZE * 64];
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);
        let mut volume = test_volume(8);
        claim_root_cluster(&mut dev, &mut volume);

        create_file(&mut dev, &mut volume, 2, "a.txt").unwrap();

        rename(&mut dev, &mut volume, 2, "a.txt", "b.txt").unwrap();
        assert!(directory::find_entry(&mut dev, &volume, 2, "a.txt").unwrap().is_none());
        assert!(directory::find_entry(&mut dev, &volume, 2, "b.txt").unwrap().is_some());

        rename(&mut dev, &mut volume, 2, "b.txt", "a.txt").unwrap();
        assert!(directory::find_entry(&mut dev, &volume, 2, "a.txt").unwrap().is_some());
        assert!(directory::find_entry(&mut dev, &volume, 2, "b.txt").unwrap().is_none());
    }

    #[test]
    fn create_then_delete_restores_free_cluster_hint() {
        static mut BACKING: [u8; BLOCK_SIZE * 64] = [0u8; BLOCK_SIZE * 64];
        let backing = unsafe { &mut *core::ptr::addr_of_mut!(BACKING) };
        let mut dev = InMemoryBlockDevice::new(backing);
        let mut volume = test_volume(8);
        claim_root_cluster(&mut dev, &mut volume);
        let hint_before = volume.free_cluster_hint;

        create_directory(&mut dev, &mut volume, 2, "newsubdirectory0").unwrap();
        delete(&mut dev, &mut volume, 2, "newsubdirectory0").unwrap();

        assert_eq!(volume.free_cluster_hint, hint_before);
    }
}
