//! Registry Module
//!
//! Server-side record of which clients hold a fresh copy of which key.
//!
//! The holder map and its reverse index are kept in lockstep: a client
//! appears in `holders[key]` exactly when `key` appears in
//! `keys_by_client[client]`. Empty holder sets are never stored, and an
//! expiry deadline only exists for a key that has holders.

use std::collections::{HashMap, HashSet};

// == Registry ==
#[derive(Debug, Default)]
pub struct Registry {
    holders: HashMap<String, HashSet<String>>,
    keys_by_client: HashMap<String, HashSet<String>>,
    /// Absolute expiry deadlines (Unix milliseconds)
    expirations: HashMap<String, u64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Put ==
    /// Records `client_id` as the sole holder of `key`.
    ///
    /// Returns the previous holders other than `client_id`, which must be
    /// sent an invalidation.
    pub fn record_put(&mut self, client_id: &str, key: &str, expire_at: Option<u64>) -> Vec<String> {
        let stale = self.clear_key(key, Some(client_id));

        self.holders
            .entry(key.to_string())
            .or_default()
            .insert(client_id.to_string());
        self.keys_by_client
            .entry(client_id.to_string())
            .or_default()
            .insert(key.to_string());
        if let Some(deadline) = expire_at {
            self.expirations.insert(key.to_string(), deadline);
        }

        stale
    }

    // == Invalidate ==
    /// Forgets every holder of `key`.
    ///
    /// Returns the previous holders other than `requester`.
    pub fn record_invalidate(&mut self, requester: &str, key: &str) -> Vec<String> {
        self.clear_key(key, Some(requester))
    }

    /// Forgets every holder of every key starting with `prefix`.
    ///
    /// Returns each client other than `requester` that held at least one
    /// matching key, once.
    pub fn record_invalidate_prefix(&mut self, requester: &str, prefix: &str) -> Vec<String> {
        let keys: Vec<String> = self
            .holders
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        let mut targets: Vec<String> = keys
            .iter()
            .flat_map(|key| self.clear_key(key, Some(requester)))
            .collect::<HashSet<String>>()
            .into_iter()
            .collect();
        targets.sort();
        targets
    }

    /// Drops `client_id` from the holder sets of `keys`.
    pub fn unregister(&mut self, client_id: &str, keys: &[String]) {
        for key in keys {
            self.forget_holder(client_id, key);
        }
    }

    // == Session Teardown ==
    /// Drops `client_id` from every holder set. Idempotent.
    ///
    /// Returns the number of keys the client held.
    pub fn remove_client(&mut self, client_id: &str) -> usize {
        let keys = self.keys_by_client.remove(client_id).unwrap_or_default();
        for key in &keys {
            if let Some(holders) = self.holders.get_mut(key) {
                holders.remove(client_id);
                if holders.is_empty() {
                    self.holders.remove(key);
                    self.expirations.remove(key);
                }
            }
        }
        keys.len()
    }

    // == Expiry ==
    /// Removes every key whose deadline is at or before `now`.
    ///
    /// Returns each expired key with the clients that held it.
    pub fn take_expired(&mut self, now: u64) -> Vec<(String, Vec<String>)> {
        let mut due: Vec<String> = self
            .expirations
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        due.sort();

        due.into_iter()
            .map(|key| {
                let holders = self.clear_key(&key, None);
                (key, holders)
            })
            .collect()
    }

    // == Queries ==
    /// Current holders of `key`, sorted.
    pub fn holders(&self, key: &str) -> Vec<String> {
        let mut holders: Vec<String> = self
            .holders
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }

    pub fn expiration(&self, key: &str) -> Option<u64> {
        self.expirations.get(key).copied()
    }

    /// Number of keys with at least one holder.
    pub fn tracked_keys(&self) -> usize {
        self.holders.len()
    }

    /// Checks that the holder map, its reverse index and the deadlines agree.
    pub fn is_consistent(&self) -> bool {
        let forward_ok = self.holders.iter().all(|(key, clients)| {
            !clients.is_empty()
                && clients.iter().all(|client| {
                    self.keys_by_client
                        .get(client)
                        .is_some_and(|keys| keys.contains(key))
                })
        });
        let reverse_ok = self.keys_by_client.iter().all(|(client, keys)| {
            !keys.is_empty()
                && keys.iter().all(|key| {
                    self.holders
                        .get(key)
                        .is_some_and(|clients| clients.contains(client))
                })
        });
        let deadlines_ok = self.expirations.keys().all(|key| self.holders.contains_key(key));
        forward_ok && reverse_ok && deadlines_ok
    }

    // == Internals ==
    /// Removes `key` entirely and returns its holders other than `except`.
    fn clear_key(&mut self, key: &str, except: Option<&str>) -> Vec<String> {
        self.expirations.remove(key);
        let previous = self.holders.remove(key).unwrap_or_default();

        let mut stale = Vec::with_capacity(previous.len());
        for client in previous {
            self.drop_reverse(&client, key);
            if Some(client.as_str()) != except {
                stale.push(client);
            }
        }
        stale.sort();
        stale
    }

    fn forget_holder(&mut self, client_id: &str, key: &str) {
        if let Some(holders) = self.holders.get_mut(key) {
            if holders.remove(client_id) && holders.is_empty() {
                self.holders.remove(key);
                self.expirations.remove(key);
            }
        }
        self.drop_reverse(client_id, key);
    }

    fn drop_reverse(&mut self, client_id: &str, key: &str) {
        if let Some(keys) = self.keys_by_client.get_mut(client_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.keys_by_client.remove(client_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_put_makes_sole_holder() {
        let mut registry = Registry::new();

        assert!(registry.record_put("a", "k", None).is_empty());
        assert_eq!(registry.record_put("b", "k", None), ids(&["a"]));
        assert_eq!(registry.holders("k"), ids(&["b"]));
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_repeated_put_by_holder_invalidates_nobody() {
        let mut registry = Registry::new();
        registry.record_put("a", "k", None);

        assert!(registry.record_put("a", "k", None).is_empty());
        assert_eq!(registry.holders("k"), ids(&["a"]));
    }

    #[test]
    fn test_invalidate_clears_holders() {
        let mut registry = Registry::new();
        registry.record_put("a", "k", Some(10));

        assert_eq!(registry.record_invalidate("b", "k"), ids(&["a"]));
        assert!(registry.holders("k").is_empty());
        assert_eq!(registry.expiration("k"), None);
        assert_eq!(registry.tracked_keys(), 0);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_invalidate_by_holder_excludes_requester() {
        let mut registry = Registry::new();
        registry.record_put("a", "k", None);

        assert!(registry.record_invalidate("a", "k").is_empty());
        assert!(registry.holders("k").is_empty());
    }

    #[test]
    fn test_invalidate_prefix_targets_each_client_once() {
        let mut registry = Registry::new();
        registry.record_put("a", "user:1", None);
        registry.record_put("a", "user:2", None);
        registry.record_put("b", "user:3", None);
        registry.record_put("c", "order:1", None);
        registry.record_put("d", "user:4", None);

        assert_eq!(
            registry.record_invalidate_prefix("d", "user:"),
            ids(&["a", "b"])
        );
        assert_eq!(registry.tracked_keys(), 1);
        assert_eq!(registry.holders("order:1"), ids(&["c"]));
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_remove_client_forgets_all_keys() {
        let mut registry = Registry::new();
        registry.record_put("a", "k1", Some(10));
        registry.record_put("a", "k2", None);
        registry.record_put("b", "k3", None);

        assert_eq!(registry.remove_client("a"), 2);
        assert_eq!(registry.remove_client("a"), 0);
        assert!(registry.holders("k1").is_empty());
        assert_eq!(registry.expiration("k1"), None);
        assert_eq!(registry.holders("k3"), ids(&["b"]));
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_unregister() {
        let mut registry = Registry::new();
        registry.record_put("a", "k1", None);
        registry.record_put("a", "k2", None);

        registry.unregister("a", &ids(&["k1", "missing"]));
        assert!(registry.holders("k1").is_empty());
        assert_eq!(registry.holders("k2"), ids(&["a"]));
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_take_expired() {
        let mut registry = Registry::new();
        registry.record_put("a", "soon", Some(100));
        registry.record_put("b", "later", Some(500));
        registry.record_put("c", "never", None);

        assert!(registry.take_expired(99).is_empty());
        assert_eq!(
            registry.take_expired(100),
            vec![("soon".to_string(), ids(&["a"]))]
        );
        assert_eq!(registry.tracked_keys(), 2);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_put_without_expiry_clears_deadline() {
        let mut registry = Registry::new();
        registry.record_put("a", "k", Some(100));
        registry.record_put("a", "k", None);

        assert_eq!(registry.expiration("k"), None);
        assert!(registry.take_expired(1_000).is_empty());
    }

    #[derive(Debug, Clone)]
    enum RegistryOp {
        Put { client: String, key: String, expire_at: Option<u64> },
        Invalidate { client: String, key: String },
        InvalidatePrefix { client: String, prefix: String },
        Unregister { client: String, key: String },
        Close { client: String },
        Expire { now: u64 },
    }

    fn registry_op_strategy() -> impl Strategy<Value = RegistryOp> {
        let client = "[a-d]";
        let key = "[xyz]{1,2}";
        prop_oneof![
            (client, key, prop::option::of(0u64..100))
                .prop_map(|(client, key, expire_at)| RegistryOp::Put { client, key, expire_at }),
            (client, key).prop_map(|(client, key)| RegistryOp::Invalidate { client, key }),
            (client, "[xyz]").prop_map(|(client, prefix)| RegistryOp::InvalidatePrefix { client, prefix }),
            (client, key).prop_map(|(client, key)| RegistryOp::Unregister { client, key }),
            client.prop_map(|client| RegistryOp::Close { client }),
            (0u64..100).prop_map(|now| RegistryOp::Expire { now }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        // The holder map and its reverse index never disagree, and a put
        // always leaves exactly one holder
        #[test]
        fn prop_registry_stays_consistent(ops in prop::collection::vec(registry_op_strategy(), 1..80)) {
            let mut registry = Registry::new();
            let mut connected: HashSet<String> = HashSet::new();

            for op in ops {
                match op {
                    RegistryOp::Put { client, key, expire_at } => {
                        let stale = registry.record_put(&client, &key, expire_at);
                        prop_assert!(!stale.contains(&client));
                        prop_assert_eq!(registry.holders(&key), vec![client.clone()]);
                        connected.insert(client);
                    }
                    RegistryOp::Invalidate { client, key } => {
                        let stale = registry.record_invalidate(&client, &key);
                        prop_assert!(!stale.contains(&client));
                        prop_assert!(registry.holders(&key).is_empty());
                    }
                    RegistryOp::InvalidatePrefix { client, prefix } => {
                        registry.record_invalidate_prefix(&client, &prefix);
                    }
                    RegistryOp::Unregister { client, key } => {
                        registry.unregister(&client, &[key.clone()]);
                        prop_assert!(!registry.holders(&key).contains(&client));
                    }
                    RegistryOp::Close { client } => {
                        registry.remove_client(&client);
                        connected.remove(&client);
                    }
                    RegistryOp::Expire { now } => {
                        registry.take_expired(now);
                    }
                }
                prop_assert!(registry.is_consistent());
            }

            // Closed clients hold nothing
            let letters = ["x", "y", "z"];
            let keys = letters
                .iter()
                .map(|a| a.to_string())
                .chain(letters.iter().flat_map(|a| letters.iter().map(move |b| format!("{}{}", a, b))));
            for key in keys {
                for holder in registry.holders(&key) {
                    prop_assert!(connected.contains(&holder));
                }
            }
        }
    }
}
