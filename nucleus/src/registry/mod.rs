/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! OS Entity Registry: three maps (`uuid -> entity`, `name_hash -> uuid`,
//! `alias_hash -> uuid`) over a fixed-capacity table, seeded once from the
//! hardware RNG at boot. Grounded on `os_entity.h` / `os_entity_registry.cpp`,
//! adapted to a no-heap registry since this kernel carries no global
//! allocator: entities are stored inline rather than behind `unique_ptr`.

use crate::sync::NullLock;
use machine::services::murmur_hash::murmur_hash64a;
use snafu::Snafu;

/// Reduced from the original's 255 bytes: this kernel has no heap, so each
/// registry slot carries its name/alias inline and a smaller bound keeps the
/// fixed table's footprint reasonable.
pub const MAX_ENTITY_NAME_LENGTH: usize = 64;
const MAX_ENTITIES: usize = 64;

/// The closed set of entity kinds known to the registry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EntityType {
    HwRng,
    SwRng,
    CharacterDevice,
    BlockDevice,
    Filesystem,
    MemoryManager,
    TaskManager,
    UserInterface,
}

#[derive(Debug, Snafu, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    #[snafu(display("no entity with that id/name/alias is registered"))]
    NoSuchEntity,
    #[snafu(display("entity id already in use"))]
    IdInUse,
    #[snafu(display("entity name already in use"))]
    NameInUse,
    #[snafu(display("entity alias already in use"))]
    AliasInUse,
    #[snafu(display("registry table is full"))]
    SaveFailed,
}

pub type Result<T> = core::result::Result<T, Error>;

/// A 128-bit identifier. Generated from two draws of the platform RNG.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Uuid(u128);

impl Uuid {
    pub const NIL: Uuid = Uuid(0);

    /// Build a version-4-ish random UUID from two 64-bit RNG draws. `next_u64`
    /// is injected so the registry doesn't need to know which board's HW RNG
    /// backs it.
    pub fn generate(mut next_u64: impl FnMut() -> u64) -> Self {
        let hi = u128::from(next_u64());
        let lo = u128::from(next_u64());
        Uuid((hi << 64) | lo)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

#[derive(Clone, Copy)]
struct FixedString {
    buf: [u8; MAX_ENTITY_NAME_LENGTH],
    len: usize,
}

impl FixedString {
    fn new(s: &str) -> Self {
        let mut buf = [0u8; MAX_ENTITY_NAME_LENGTH];
        let len = s.len().min(MAX_ENTITY_NAME_LENGTH);
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self { buf, len }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

/// A named singleton registered with the kernel: `{uuid, name, alias}` plus
/// a type tag and the hashes used to look it up.
#[derive(Clone, Copy)]
pub struct Entity {
    pub uuid: Uuid,
    pub entity_type: EntityType,
    pub permanent: bool,
    name: FixedString,
    alias: FixedString,
    name_hash: u64,
    alias_hash: u64,
}

impl Entity {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn alias(&self) -> &str {
        self.alias.as_str()
    }
}

/// The registry table itself. `hash_seed` starts at zero and must be set
/// once from the hardware RNG during platform init, before any entity is
/// added, so name/alias hashes are stable for the life of the kernel.
pub struct Registry {
    entities: [Option<Entity>; MAX_ENTITIES],
    hash_seed: u64,
}

impl Registry {
    pub const fn new() -> Self {
        const NONE: Option<Entity> = None;
        Self {
            entities: [NONE; MAX_ENTITIES],
            hash_seed: 0,
        }
    }

    /// Must be called exactly once, before the first `add_entity`, with a
    /// seed drawn from the platform's hardware RNG.
    pub fn seed_hashes(&mut self, seed: u64) {
        self.hash_seed = seed;
    }

    fn hash(&self, s: &str) -> u64 {
        murmur_hash64a(s.as_bytes(), self.hash_seed)
    }

    fn index_by_id(&self, id: Uuid) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| matches!(e, Some(entity) if entity.uuid == id))
    }

    fn index_by_name_hash(&self, hash: u64) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| matches!(e, Some(entity) if entity.name_hash == hash))
    }

    fn index_by_alias_hash(&self, hash: u64) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| matches!(e, Some(entity) if entity.alias_hash == hash))
    }

    /// Register a new entity, refusing on any uuid/name/alias collision.
    pub fn add_entity(
        &mut self,
        entity_type: EntityType,
        permanent: bool,
        name: &str,
        alias: &str,
        next_u64: impl FnMut() -> u64,
    ) -> Result<Uuid> {
        let name_hash = self.hash(name);
        let alias_hash = self.hash(alias);

        if self.index_by_name_hash(name_hash).is_some() {
            return Err(Error::NameInUse);
        }
        if self.index_by_alias_hash(alias_hash).is_some() {
            return Err(Error::AliasInUse);
        }

        let uuid = Uuid::generate(next_u64);
        if self.index_by_id(uuid).is_some() {
            return Err(Error::IdInUse);
        }

        let slot = self
            .entities
            .iter()
            .position(Option::is_none)
            .ok_or(Error::SaveFailed)?;

        self.entities[slot] = Some(Entity {
            uuid,
            entity_type,
            permanent,
            name: FixedString::new(name),
            alias: FixedString::new(alias),
            name_hash,
            alias_hash,
        });

        Ok(uuid)
    }

    pub fn get_entity_by_id(&self, id: Uuid) -> Result<&Entity> {
        let index = self.index_by_id(id).ok_or(Error::NoSuchEntity)?;
        Ok(self.entities[index].as_ref().unwrap())
    }

    pub fn get_entity_by_name(&self, name: &str) -> Result<&Entity> {
        let hash = self.hash(name);
        let index = self.index_by_name_hash(hash).ok_or(Error::NoSuchEntity)?;
        Ok(self.entities[index].as_ref().unwrap())
    }

    pub fn get_entity_by_alias(&self, alias: &str) -> Result<&Entity> {
        let hash = self.hash(alias);
        let index = self.index_by_alias_hash(hash).ok_or(Error::NoSuchEntity)?;
        Ok(self.entities[index].as_ref().unwrap())
    }

    pub fn remove_entity_by_id(&mut self, id: Uuid) -> Result<()> {
        let index = self.index_by_id(id).ok_or(Error::NoSuchEntity)?;
        self.entities[index] = None;
        Ok(())
    }

    /// Enumerate the ids of every entity of the given type.
    pub fn find_entities_by_type(&self, entity_type: EntityType) -> impl Iterator<Item = Uuid> + '_ {
        self.entities.iter().filter_map(move |e| match e {
            Some(entity) if entity.entity_type == entity_type => Some(entity.uuid),
            _ => None,
        })
    }
}

static REGISTRY: NullLock<Registry> = NullLock::new(Registry::new());

/// Access the kernel-wide entity registry.
pub fn registry() -> &'static NullLock<Registry> {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_rng(start: u64) -> impl FnMut() -> u64 {
        let mut n = start;
        move || {
            n = n.wrapping_add(1);
            n
        }
    }

    #[test]
    fn add_then_lookup_by_name_and_alias() {
        let mut registry = Registry::new();
        registry.seed_hashes(42);

        let id = registry
            .add_entity(
                EntityType::BlockDevice,
                true,
                "emmc0",
                "sdcard",
                counting_rng(0),
            )
            .unwrap();

        assert_eq!(registry.get_entity_by_name("emmc0").unwrap().uuid, id);
        assert_eq!(registry.get_entity_by_alias("sdcard").unwrap().uuid, id);
        assert_eq!(registry.get_entity_by_id(id).unwrap().name(), "emmc0");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = Registry::new();
        registry.seed_hashes(1);
        registry
            .add_entity(EntityType::BlockDevice, true, "a", "alias-a", counting_rng(0))
            .unwrap();

        let result = registry.add_entity(EntityType::BlockDevice, true, "a", "alias-b", counting_rng(10));
        assert_eq!(result, Err(Error::NameInUse));
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let mut registry = Registry::new();
        registry.seed_hashes(1);
        registry
            .add_entity(EntityType::BlockDevice, true, "a", "shared", counting_rng(0))
            .unwrap();

        let result = registry.add_entity(EntityType::BlockDevice, true, "b", "shared", counting_rng(10));
        assert_eq!(result, Err(Error::AliasInUse));
    }

    #[test]
    fn missing_entity_lookup_reports_not_found() {
        let registry = Registry::new();
        assert_eq!(registry.get_entity_by_name("nope"), Err(Error::NoSuchEntity));
    }

    #[test]
    fn type_filtered_enumeration_finds_only_matching_entities() {
        let mut registry = Registry::new();
        registry.seed_hashes(9);
        registry
            .add_entity(EntityType::BlockDevice, true, "emmc0", "sdcard", counting_rng(0))
            .unwrap();
        registry
            .add_entity(EntityType::Filesystem, true, "fat0", "disk", counting_rng(10))
            .unwrap();

        let mut block_devices = registry.find_entities_by_type(EntityType::BlockDevice);
        assert!(block_devices.next().is_some());
        assert!(block_devices.next().is_none());
    }
}
