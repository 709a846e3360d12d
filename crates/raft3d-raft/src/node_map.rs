//! Mapping between string node names and u64 Raft node ids.
//!
//! Operators name nodes with strings ("node1") while openraft wants
//! u64 ids. Ids are derived with a deterministic hash so every node
//! computes the same id for the same name, and the assignments are
//! persisted in redb so restarts keep them stable.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::tables::NODE_IDS;

#[derive(Default)]
struct Maps {
    forward: HashMap<String, u64>,
    reverse: HashMap<u64, String>,
}

/// Bidirectional map between node name and Raft id.
pub struct NodeIdMap {
    db: Arc<Database>,
    maps: RwLock<Maps>,
}

impl NodeIdMap {
    /// Open the map in `db`, loading any persisted assignments.
    pub fn new(db: Arc<Database>) -> Result<Self, redb::Error> {
        let txn = db.begin_write()?;
        txn.open_table(NODE_IDS)?;
        txn.commit()?;

        let mut maps = Maps::default();
        {
            let txn = db.begin_read()?;
            let table = txn.open_table(NODE_IDS)?;
            for item in table.iter()? {
                let (k, v) = item?;
                let raft_id = k.value();
                let name = v.value().to_string();
                maps.forward.insert(name.clone(), raft_id);
                maps.reverse.insert(raft_id, name);
            }
        }

        Ok(Self {
            db,
            maps: RwLock::new(maps),
        })
    }

    /// The Raft id for `name`, assigning and persisting one if needed.
    ///
    /// Colliding hashes probe upward until a free id is found.
    pub fn get_or_insert(&self, name: &str) -> Result<u64, redb::Error> {
        if let Some(id) = self.raft_id(name) {
            return Ok(id);
        }

        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(&id) = maps.forward.get(name) {
            return Ok(id);
        }

        let mut raft_id = raft_id_for(name);
        while maps.reverse.contains_key(&raft_id) {
            raft_id = raft_id.wrapping_add(1).max(1);
        }

        self.persist(raft_id, name)?;
        maps.forward.insert(name.to_string(), raft_id);
        maps.reverse.insert(raft_id, name.to_string());

        debug!(name, raft_id, "mapped node name");
        Ok(raft_id)
    }

    pub fn raft_id(&self, name: &str) -> Option<u64> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.forward.get(name).copied()
    }

    pub fn name(&self, raft_id: u64) -> Option<String> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.reverse.get(&raft_id).cloned()
    }

    pub fn len(&self) -> usize {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, raft_id: u64, name: &str) -> Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(NODE_IDS)?;
            table.insert(raft_id, name)?;
        }
        txn.commit()?;
        Ok(())
    }
}

/// FNV-1a 64-bit hash of the node name. Never zero.
pub fn raft_id_for(name: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in name.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash.max(1)
}
