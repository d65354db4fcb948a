use crate::remote::{Client, ClientConfig, Transport};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Clients keyed by their configuration (base URL, token and prefix).
///
/// Entries live until they are invalidated; nothing expires on its own.
#[derive(Default)]
pub struct ClientCache {
    clients: RwLock<HashMap<ClientConfig, Client>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached client for `config`, creating an HTTP one on first use.
    pub fn get_or_create(&self, config: &ClientConfig) -> Client {
        if let Some(client) = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(config)
        {
            return client.clone();
        }
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(config.clone())
            .or_insert_with(|| Client::new(config.clone()))
            .clone()
    }

    /// Caches a client built over `transport`, replacing any previous one.
    pub fn insert(&self, config: ClientConfig, transport: Arc<dyn Transport>) -> Client {
        let client = Client::with_transport(config.clone(), transport);
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        if clients.insert(config, client.clone()).is_some() {
            log::warn!("Replaced cached client for {}", client.config().root_url());
        }
        client
    }

    /// Drops the client for `config`. Returns whether one was cached.
    pub fn invalidate(&self, config: &ClientConfig) -> bool {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(config)
            .is_some()
    }

    pub fn clear(&self) {
        self.clients.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: &str) -> ClientConfig {
        ClientConfig {
            base_url: "http://localhost:8000".into(),
            token: token.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_keyed_by_url_and_token() {
        let cache = ClientCache::new();
        cache.get_or_create(&config("a"));
        cache.get_or_create(&config("a"));
        assert_eq!(cache.len(), 1);
        cache.get_or_create(&config("b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate() {
        let cache = ClientCache::new();
        cache.get_or_create(&config("a"));
        assert!(cache.invalidate(&config("a")));
        assert!(!cache.invalidate(&config("a")));
        assert!(cache.is_empty());
    }
}
