//! Hot-path container aliases used by core data structures.
//!
//! Container choices are centralized here so allocator or container upgrades
//! can be done in one place without touching data-structure modules.

use hashbrown::HashMap as HbMap;

/// Hot-path hash map used by secondary indexes and the command table.
pub type HotMap<K, V> = HbMap<K, V>;
