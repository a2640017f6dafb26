pub mod backend;
pub mod file;
pub mod memory;
pub mod compression;
pub mod layout;
pub mod partitioning;
pub mod column_file;
pub mod predicate;
pub mod read_store;
pub mod write_store;

#[cfg(all(test, not(feature = "integration")))]
pub mod test_utils {
    use crate::storage::backend::StorageBackend;
    use crate::storage::file::FileBackend;
    use crate::storage::memory::MemoryObjectStore;
    use std::path::PathBuf;
    use std::sync::Arc;

    pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("armor_{}_{}", prefix, rand::random::<u64>()))
    }

    pub(crate) fn backends(prefix: &str) -> Vec<Arc<dyn StorageBackend>> {
        let file = FileBackend::new(temp_dir(prefix)).expect("file backend");
        vec![Arc::new(file), Arc::new(MemoryObjectStore::new())]
    }
}
