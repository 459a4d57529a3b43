//! Narrow interfaces to the surrounding cluster
//!
//! The extensions never talk to the cluster API directly; they consume
//! these traits. The in-memory implementation backs tests and embedding.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{SchedletError, SchedletResult};

/// Read/write access to named cluster config objects.
pub trait ConfigStore: Send + Sync {
    /// Value stored under `key` of the config object `name`, if any.
    fn get(&self, name: &str, key: &str) -> SchedletResult<Option<String>>;

    /// Write `value` under `key` of the config object `name`, creating it
    /// when absent.
    fn put(&self, name: &str, key: &str, value: &str) -> SchedletResult<()>;
}

/// Persists annotation patches onto workload units.
pub trait MetadataStore: Send + Sync {
    /// Merge `annotations` into the unit's metadata. Implementations fail
    /// with [`SchedletError::MetadataPersist`]; nothing is partially
    /// written on failure.
    fn patch_annotations(
        &self,
        namespace: &str,
        unit_name: &str,
        annotations: &HashMap<String, String>,
    ) -> SchedletResult<()>;
}

/// Cluster-level mutual exclusion around a node.
pub trait NodeLock: Send + Sync {
    /// Take the lock on `node` for `owner`. Implementations fail with
    /// [`SchedletError::LockUnavailable`] when the node is already held.
    fn lock_node(&self, node: &str, owner: &str) -> SchedletResult<()>;
}

/// In-memory cluster state for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryCluster {
    configs: RwLock<HashMap<(String, String), String>>,
    annotations: RwLock<HashMap<String, HashMap<String, String>>>,
    locks: RwLock<HashMap<String, String>>,
}

impl MemoryCluster {
    /// Annotations currently persisted for `namespace/unit_name`.
    pub fn annotations_for(&self, namespace: &str, unit_name: &str) -> HashMap<String, String> {
        self.annotations
            .read()
            .ok()
            .and_then(|m| m.get(&unit_key(namespace, unit_name)).cloned())
            .unwrap_or_default()
    }

    /// Drop the lock on `node`, if held.
    pub fn unlock_node(&self, node: &str) {
        if let Ok(mut locks) = self.locks.write() {
            locks.remove(node);
        }
    }
}

fn unit_key(namespace: &str, unit_name: &str) -> String {
    format!("{namespace}/{unit_name}")
}

impl ConfigStore for MemoryCluster {
    fn get(&self, name: &str, key: &str) -> SchedletResult<Option<String>> {
        let configs = self
            .configs
            .read()
            .map_err(|_| SchedletError::Config("config store lock poisoned".to_string()))?;
        Ok(configs.get(&(name.to_string(), key.to_string())).cloned())
    }

    fn put(&self, name: &str, key: &str, value: &str) -> SchedletResult<()> {
        let mut configs = self
            .configs
            .write()
            .map_err(|_| SchedletError::Config("config store lock poisoned".to_string()))?;
        configs.insert((name.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

impl MetadataStore for MemoryCluster {
    fn patch_annotations(
        &self,
        namespace: &str,
        unit_name: &str,
        annotations: &HashMap<String, String>,
    ) -> SchedletResult<()> {
        let mut all = self
            .annotations
            .write()
            .map_err(|_| SchedletError::MetadataPersist("metadata lock poisoned".to_string()))?;
        all.entry(unit_key(namespace, unit_name))
            .or_default()
            .extend(annotations.clone());
        Ok(())
    }
}

impl NodeLock for MemoryCluster {
    fn lock_node(&self, node: &str, owner: &str) -> SchedletResult<()> {
        let mut locks = self
            .locks
            .write()
            .map_err(|_| SchedletError::LockUnavailable("lock table poisoned".to_string()))?;
        if let Some(holder) = locks.get(node) {
            return Err(SchedletError::LockUnavailable(format!(
                "node {node} locked by {holder}"
            )));
        }
        locks.insert(node.to_string(), owner.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_store_round_trip() {
        let cluster = MemoryCluster::default();
        assert_eq!(cluster.get("nettopo", "topo.json").unwrap(), None);

        cluster.put("nettopo", "topo.json", "[]").unwrap();
        assert_eq!(
            cluster.get("nettopo", "topo.json").unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn test_patch_annotations_merges() {
        let cluster = MemoryCluster::default();
        let first = HashMap::from([("a".to_string(), "1".to_string())]);
        let second = HashMap::from([("b".to_string(), "2".to_string())]);

        cluster.patch_annotations("default", "unit-0", &first).unwrap();
        cluster.patch_annotations("default", "unit-0", &second).unwrap();

        let merged = cluster.annotations_for("default", "unit-0");
        assert_eq!(merged.get("a").map(String::as_str), Some("1"));
        assert_eq!(merged.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_node_lock_exclusive() {
        let cluster = MemoryCluster::default();
        cluster.lock_node("node-1", "accelcore").unwrap();

        let denied = cluster.lock_node("node-1", "accelcore");
        assert!(matches!(denied, Err(SchedletError::LockUnavailable(_))));

        cluster.unlock_node("node-1");
        cluster.lock_node("node-1", "accelcore").unwrap();
    }
}
