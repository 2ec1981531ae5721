//! In-memory storage backend for vudata.
//!
//! All families live behind one `RwLock`, so every mutation takes the same
//! global write lock and reads proceed concurrently with each other.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use vudata_core::{CollectionName, Family, QueueItem, StorageBackend, StorageError};

#[derive(Default)]
struct QueueLog {
    last_position: u64,
    items: VecDeque<QueueItem>,
}

#[derive(Default)]
struct State {
    counters: BTreeMap<CollectionName, i64>,
    entries: BTreeMap<CollectionName, String>,
    queues: BTreeMap<CollectionName, QueueLog>,
}

pub struct InMemoryStorage {
    state: RwLock<State>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StorageError> {
        self.state
            .read()
            .map_err(|_| StorageError::Other("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StorageError> {
        self.state
            .write()
            .map_err(|_| StorageError::Other("in-memory store lock poisoned".to_string()))
    }
}

fn keys<V>(map: &BTreeMap<CollectionName, V>) -> Vec<String> {
    map.keys().map(|k| k.to_string()).collect()
}

impl StorageBackend for InMemoryStorage {
    fn collection_exists(&self, family: Family, name: &CollectionName) -> Result<bool, StorageError> {
        let state = self.read()?;
        Ok(match family {
            Family::Counter => state.counters.contains_key(name),
            Family::Map => state.entries.contains_key(name),
            Family::Queue => state.queues.contains_key(name),
        })
    }

    fn list_collections(&self, family: Family) -> Result<Vec<String>, StorageError> {
        let state = self.read()?;
        Ok(match family {
            Family::Counter => keys(&state.counters),
            Family::Map => keys(&state.entries),
            Family::Queue => keys(&state.queues),
        })
    }

    fn set_counter(&self, name: &CollectionName, value: i64) -> Result<(), StorageError> {
        self.write()?.counters.insert(name.clone(), value);
        Ok(())
    }

    fn increment_counter(&self, name: &CollectionName) -> Result<i64, StorageError> {
        let mut state = self.write()?;
        let value = state.counters.entry(name.clone()).or_insert(0);
        *value = value
            .checked_add(1)
            .ok_or_else(|| StorageError::Overflow(name.to_string()))?;
        Ok(*value)
    }

    fn delete_counter(&self, name: &CollectionName) -> Result<(), StorageError> {
        self.write()?.counters.remove(name);
        Ok(())
    }

    fn put_entry(&self, name: &CollectionName, payload: &str) -> Result<(), StorageError> {
        self.write()?.entries.insert(name.clone(), payload.to_string());
        Ok(())
    }

    fn get_entry(&self, name: &CollectionName) -> Result<Option<String>, StorageError> {
        Ok(self.read()?.entries.get(name).cloned())
    }

    fn delete_entry(&self, name: &CollectionName) -> Result<(), StorageError> {
        self.write()?.entries.remove(name);
        Ok(())
    }

    fn push_items(&self, name: &CollectionName, payloads: &[String]) -> Result<Vec<QueueItem>, StorageError> {
        let mut state = self.write()?;
        let log = state.queues.entry(name.clone()).or_default();
        let mut pushed = Vec::with_capacity(payloads.len());
        for payload in payloads {
            log.last_position += 1;
            let item = QueueItem::new(log.last_position, payload.as_str());
            log.items.push_back(item.clone());
            pushed.push(item);
        }
        tracing::trace!(queue = %name, count = pushed.len(), last_position = log.last_position, "items pushed");
        Ok(pushed)
    }

    fn pop_items(
        &self,
        name: &CollectionName,
        limit: usize,
        check: &mut dyn FnMut(&QueueItem) -> Result<(), StorageError>,
    ) -> Result<Option<Vec<QueueItem>>, StorageError> {
        let mut state = self.write()?;
        let Some(log) = state.queues.get_mut(name) else {
            return Ok(None);
        };
        let take = limit.min(log.items.len());
        for item in log.items.range(..take) {
            check(item)?;
        }
        Ok(Some(log.items.drain(..take).collect()))
    }

    fn peek_item(&self, name: &CollectionName) -> Result<Option<Option<QueueItem>>, StorageError> {
        let state = self.read()?;
        Ok(state.queues.get(name).map(|log| log.items.front().cloned()))
    }

    fn queue_depth(&self, name: &CollectionName) -> Result<Option<u64>, StorageError> {
        let state = self.read()?;
        Ok(state.queues.get(name).map(|log| log.items.len() as u64))
    }

    fn drop_queue(&self, name: &CollectionName) -> Result<(), StorageError> {
        self.write()?.queues.remove(name);
        Ok(())
    }
}
