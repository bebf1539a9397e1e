use crate::store::{Store, StoreConfig};

/// Owns the application's default store and hands out local stores that read
/// through to it.
///
/// There is no process-wide singleton: create one registry at startup and
/// pass it (or its stores) to whatever needs them.
#[derive(Clone, Debug)]
pub struct StoreRegistry {
    default: Store,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::labelled("default"))
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            default: Store::with_config(config),
        }
    }

    pub fn default_store(&self) -> &Store {
        &self.default
    }

    /// A fresh local store. Each call yields an independent store; state it
    /// registers shadows the default store's value of the same type.
    pub fn local(&self) -> Store {
        self.default.local()
    }

    pub fn local_with_config(&self, config: StoreConfig) -> Store {
        self.default.local_with_config(config)
    }
}
