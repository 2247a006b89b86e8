// SPDX-License-Identifier: BlueOak-1.0.0

//! Bounded LRU directory cache (C7): a `first_cluster -> entry` index plus a
//! secondary `path_hash -> first_cluster` index, so a lookup by absolute path
//! doesn't require walking the directory tree.

use crate::directory::{EntryAddress, EntryType};
use machine::services::murmur_hash::murmur_hash64a;

const CAPACITY: usize = 32;

/// Cached absolute paths are bounded well below spec's 4096-byte path limit;
/// this kernel only ever caches directories a handful of levels deep, and
/// capping per-entry storage keeps the cache's footprint small and fixed.
const MAX_CACHED_PATH_LEN: usize = 128;

struct CacheEntry {
    entry_type: EntryType,
    entry_address: EntryAddress,
    first_cluster: u32,
    short_name: [u8; 11],
    path: [u8; MAX_CACHED_PATH_LEN],
    path_len: usize,
    path_hash: u64,
    last_used: u64,
}

/// A read-only view into one cached entry, returned from lookups.
pub struct CachedEntry<'a> {
    pub entry_type: EntryType,
    pub entry_address: EntryAddress,
    pub first_cluster: u32,
    pub short_name: [u8; 11],
    path: &'a [u8],
}

impl<'a> CachedEntry<'a> {
    pub fn absolute_path(&self) -> &str {
        core::str::from_utf8(self.path).unwrap_or("")
    }
}

pub struct DirectoryCache {
    entries: [Option<CacheEntry>; CAPACITY],
    clock: u64,
    path_hash_seed: u64,
    collisions: u32,
}

impl DirectoryCache {
    /// `path_hash_seed` should come from the general-purpose RNG so that
    /// different cache instances have independent hash spaces.
    pub fn new(path_hash_seed: u64) -> Self {
        const NONE: Option<CacheEntry> = None;
        Self {
            entries: [NONE; CAPACITY],
            clock: 0,
            path_hash_seed,
            collisions: 0,
        }
    }

    pub fn collision_count(&self) -> u32 {
        self.collisions
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn index_by_cluster(&self, first_cluster: u32) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, Some(entry) if entry.first_cluster == first_cluster))
    }

    fn index_by_hash(&self, path_hash: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, Some(entry) if entry.path_hash == path_hash))
    }

    fn evict_slot(&mut self) -> usize {
        if let Some(free) = self.entries.iter().position(|e| e.is_none()) {
            return free;
        }

        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.as_ref().map(|entry| entry.last_used).unwrap_or(0))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Insert a new entry. On a collision with either index, increments the
    /// collision counter and leaves the cache unchanged.
    pub fn add(
        &mut self,
        entry_type: EntryType,
        entry_address: EntryAddress,
        first_cluster: u32,
        short_name: [u8; 11],
        absolute_path: &str,
    ) {
        let path_hash = murmur_hash64a(absolute_path.as_bytes(), self.path_hash_seed);

        if self.index_by_cluster(first_cluster).is_some() || self.index_by_hash(path_hash).is_some() {
            self.collisions += 1;
            return;
        }

        let mut path = [0u8; MAX_CACHED_PATH_LEN];
        let path_len = absolute_path.len().min(MAX_CACHED_PATH_LEN);
        path[..path_len].copy_from_slice(&absolute_path.as_bytes()[..path_len]);

        let last_used = self.tick();
        let slot = self.evict_slot();
        self.entries[slot] = Some(CacheEntry {
            entry_type,
            entry_address,
            first_cluster,
            short_name,
            path,
            path_len,
            path_hash,
            last_used,
        });
    }

    pub fn find_by_cluster(&mut self, first_cluster: u32) -> Option<CachedEntry<'_>> {
        let index = self.index_by_cluster(first_cluster)?;
        let tick = self.tick();
        let entry = self.entries[index].as_mut().unwrap();
        entry.last_used = tick;
        Some(CachedEntry {
            entry_type: entry.entry_type,
            entry_address: entry.entry_address,
            first_cluster: entry.first_cluster,
            short_name: entry.short_name,
            path: &entry.path[..entry.path_len],
        })
    }

    /// Looks up by path hash, then verifies the stored absolute path string
    /// matches, guarding against a 64-bit hash collision.
    pub fn find_by_path(&mut self, absolute_path: &str) -> Option<CachedEntry<'_>> {
        let path_hash = murmur_hash64a(absolute_path.as_bytes(), self.path_hash_seed);
        let index = self.index_by_hash(path_hash)?;

        {
            let entry = self.entries[index].as_ref().unwrap();
            if &entry.path[..entry.path_len] != absolute_path.as_bytes() {
                return None;
            }
        }

        let tick = self.tick();
        let entry = self.entries[index].as_mut().unwrap();
        entry.last_used = tick;
        Some(CachedEntry {
            entry_type: entry.entry_type,
            entry_address: entry.entry_address,
            first_cluster: entry.first_cluster,
            short_name: entry.short_name,
            path: &entry.path[..entry.path_len],
        })
    }

    pub fn remove(&mut self, first_cluster: u32) {
        if let Some(index) = self.index_by_cluster(first_cluster) {
            self.entries[index] = None;
        }
    }

    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::EntryAddress;

    fn addr(cluster: u32) -> EntryAddress {
        EntryAddress {
            directory_first_cluster: cluster,
            cluster_offset: 0,
            sector_offset: 0,
            index_within_sector: 0,
        }
    }

    #[test]
    fn add_then_find_by_cluster_promotes_mru() {
        let mut cache = DirectoryCache::new(7);
        cache.add(EntryType::Directory, addr(10), 10, *b"HOME       ", "/home");
        let found = cache.find_by_cluster(10).unwrap();
        assert_eq!(found.first_cluster, 10);
        assert_eq!(found.absolute_path(), "/home");
    }

    #[test]
    fn find_by_path_verifies_full_string_against_hash_collision() {
        let mut cache = DirectoryCache::new(1);
        cache.add(EntryType::Directory, addr(1), 1, [b' '; 11], "/a");
        assert!(cache.find_by_path("/a").is_some());
        assert!(cache.find_by_path("/does-not-exist").is_none());
    }

    #[test]
    fn colliding_cluster_key_is_rejected_and_counted() {
        let mut cache = DirectoryCache::new(3);
        cache.add(EntryType::Directory, addr(5), 5, [b' '; 11], "/a");
        cache.add(EntryType::File, addr(5), 5, [b' '; 11], "/b");
        assert_eq!(cache.collision_count(), 1);
    }

    #[test]
    fn remove_drops_entry() {
        let mut cache = DirectoryCache::new(2);
        cache.add(EntryType::File, addr(9), 9, [b' '; 11], "/f");
        cache.remove(9);
        assert!(cache.find_by_cluster(9).is_none());
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache = DirectoryCache::new(2);
        cache.add(EntryType::File, addr(9), 9, [b' '; 11], "/f");
        cache.clear();
        assert!(cache.find_by_cluster(9).is_none());
    }

    #[test]
    fn eviction_prefers_least_recently_used_when_full() {
        let mut cache = DirectoryCache::new(4);
        for i in 0..CAPACITY as u32 {
            let path = std::format!("/f{i}");
            cache.add(EntryType::File, addr(i), i, [b' '; 11], &path);
        }
        // touch cluster 1 so it becomes MRU and survives the next insert
        cache.find_by_cluster(1);
        cache.add(EntryType::File, addr(1000), 1000, [b' '; 11], "/new");
        assert!(cache.find_by_cluster(1).is_some());
    }
}
