use std::sync::Arc;

use vudata_core::StorageBackend;

use crate::{counter::CounterEngine, map::MapStore, queue::QueueEngine, registry::Registry};

/// All primitive engines over one shared store.
pub struct Primitives {
    pub registry: Registry,
    pub counters: CounterEngine,
    pub maps: MapStore,
    pub queues: QueueEngine,
}

impl Primitives {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            registry: Registry::new(storage.clone()),
            counters: CounterEngine::new(storage.clone()),
            maps: MapStore::new(storage.clone()),
            queues: QueueEngine::new(storage),
        }
    }
}
