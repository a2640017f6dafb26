use crate::storage::backend::{Entry, StorageBackend};
use crate::ArmorError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

/// Object store kept in memory: flat keys, directories derived from key prefixes.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Result<Vec<String>, ArmorError> {
        Ok(self.objects.read()?.keys().cloned().collect())
    }

    fn prefix_of(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() { String::new() } else { format!("{}/", trimmed) }
    }
}

impl StorageBackend for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn list(&self, path: &str) -> Result<Option<Vec<Entry>>, ArmorError> {
        let prefix = Self::prefix_of(path);
        let objects = self.objects.read()?;
        let mut entries: BTreeSet<Entry> = BTreeSet::new();
        for key in objects.range(prefix.clone()..).map(|(k, _)| k).take_while(|k| k.starts_with(&prefix)) {
            let rest = &key[prefix.len()..];
            let entry = match rest.split_once('/') {
                Some((dir, _)) => Entry { name: dir.to_string(), is_dir: true },
                None => Entry { name: rest.to_string(), is_dir: false },
            };
            entries.insert(entry);
        }
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(entries.into_iter().collect()))
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ArmorError> {
        Ok(self.objects.read()?.get(path.trim_matches('/')).cloned())
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), ArmorError> {
        self.objects.write()?.insert(path.trim_matches('/').to_string(), bytes.to_vec());
        Ok(())
    }

    fn replace(&self, path: &str, bytes: &[u8]) -> Result<(), ArmorError> {
        self.write(path, bytes)
    }

    fn exists(&self, path: &str) -> Result<bool, ArmorError> {
        let key = path.trim_matches('/');
        let prefix = Self::prefix_of(path);
        let objects = self.objects.read()?;
        Ok(objects.contains_key(key) || objects.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix)))
    }
}
