use crate::ArmorError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
}

/// Paths are `/` separated and relative to the backend root, `""` being the root itself.
/// Object stores simulate directories through key prefixes.
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Immediate children of `path`, `None` when nothing exists below it.
    fn list(&self, path: &str) -> Result<Option<Vec<Entry>>, ArmorError>;

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ArmorError>;

    /// Durable write of a new, immutable object.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), ArmorError>;

    /// Readers observe either the previous or the new bytes, never a mix.
    fn replace(&self, path: &str, bytes: &[u8]) -> Result<(), ArmorError>;

    fn exists(&self, path: &str) -> Result<bool, ArmorError>;

    fn list_dirs(&self, path: &str) -> Result<Vec<String>, ArmorError> {
        let mut dirs: Vec<String> = self.list(path)?.unwrap_or_default().into_iter().filter(|e| e.is_dir).map(|e| e.name).collect();
        dirs.sort();
        Ok(dirs)
    }

    fn list_files(&self, path: &str) -> Result<Vec<String>, ArmorError> {
        let mut files: Vec<String> = self.list(path)?.unwrap_or_default().into_iter().filter(|e| !e.is_dir).map(|e| e.name).collect();
        files.sort();
        Ok(files)
    }
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use crate::storage::test_utils::backends;

    #[test]
    fn backends_agree_on_directory_semantics() {
        for backend in backends("backend") {
            assert_eq!(backend.list("org1").unwrap(), None, "{}", backend.name());
            assert!(backend.list_dirs("").unwrap().is_empty());

            backend.write("org1/t1/single/1970-01-01T00:00:00Z/0/v1/name_S", b"a").unwrap();
            backend.write("org1/t1/single/1970-01-01T00:00:00Z/0/v1/level_I", b"b").unwrap();
            backend.replace("org1/t1/single/1970-01-01T00:00:00Z/0/current", b"{}").unwrap();
            backend.write("org2/t1/table-metadata", b"{}").unwrap();

            assert_eq!(backend.list_dirs("").unwrap(), vec!["org1", "org2"]);
            assert_eq!(backend.list_dirs("org1").unwrap(), vec!["t1"]);
            assert!(backend.list_files("org1").unwrap().is_empty());
            assert_eq!(backend.list_files("org2/t1").unwrap(), vec!["table-metadata"]);
            assert_eq!(backend.list_dirs("org1/t1/single/1970-01-01T00:00:00Z/0").unwrap(), vec!["v1"]);
            assert_eq!(backend.list_files("org1/t1/single/1970-01-01T00:00:00Z/0").unwrap(), vec!["current"]);
            assert_eq!(backend.list_files("org1/t1/single/1970-01-01T00:00:00Z/0/v1").unwrap(), vec!["level_I", "name_S"]);

            assert!(backend.exists("org1/t1").unwrap());
            assert!(backend.exists("org1/t1/single/1970-01-01T00:00:00Z/0/v1/name_S").unwrap());
            assert!(!backend.exists("org1/t2").unwrap());
            assert!(!backend.exists("org1/t").unwrap());

            assert_eq!(backend.read("org1/t1/single/1970-01-01T00:00:00Z/0/v1/name_S").unwrap(), Some(b"a".to_vec()));
            assert_eq!(backend.read("org1/missing").unwrap(), None);
        }
    }

    #[test]
    fn replace_swaps_whole_record() {
        for backend in backends("replace") {
            backend.replace("org/t/x/s/0/current", b"{\"current\":\"v1\"}").unwrap();
            backend.replace("org/t/x/s/0/current", b"{\"current\":\"v2\"}").unwrap();
            assert_eq!(backend.read("org/t/x/s/0/current").unwrap(), Some(b"{\"current\":\"v2\"}".to_vec()));
            assert_eq!(backend.list_files("org/t/x/s/0").unwrap(), vec!["current"], "{}", backend.name());
        }
    }
}
