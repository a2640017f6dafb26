use crate::entity::EntityId;
use crate::interval::Interval;
use crate::meta::{ShardMetadata, TableMetadata};
use crate::shard::ShardId;
use crate::storage::backend::StorageBackend;
use crate::storage::column_file::ColumnFile;
use crate::storage::compression::Compression;
use crate::storage::layout;
use crate::storage::partitioning::EntityRouter;
use crate::storage::read_store::{CurrentPointer, ReadStore};
use crate::ArmorError;
use chrono::{DateTime, Utc};
use log::debug;
use std::sync::Arc;

/// Write side of the layout: version directories are written once, only `current` and
/// `table-metadata` are ever replaced.
#[derive(Clone)]
pub struct WriteStore {
    read: ReadStore,
    router: Arc<dyn EntityRouter>,
    compression: Compression,
}

impl WriteStore {
    pub fn new(backend: Arc<dyn StorageBackend>, router: Arc<dyn EntityRouter>, compression: Compression) -> Self {
        Self { read: ReadStore::new(backend), router, compression }
    }

    pub fn read_store(&self) -> &ReadStore {
        &self.read
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        self.read.backend()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn shard_count(&self) -> usize {
        self.router.shard_count()
    }

    pub fn find_shard_id(&self, tenant: &str, table: &str, interval: Interval, timestamp: DateTime<Utc>, entity_id: &EntityId) -> ShardId {
        let shard_num = self.router.shard_num(tenant, table, entity_id);
        ShardId::for_timestamp(tenant, table, interval, timestamp, shard_num)
    }

    pub fn load_table_metadata(&self, tenant: &str, table: &str) -> Result<Option<TableMetadata>, ArmorError> {
        self.read.load_table_metadata(tenant, table)
    }

    pub fn save_table_metadata(&self, tenant: &str, table: &str, metadata: &TableMetadata) -> Result<(), ArmorError> {
        let bytes = serde_json::to_vec_pretty(metadata)?;
        self.backend().replace(&layout::table_metadata_path(tenant, table), &bytes)
    }

    pub fn current_version(&self, shard_id: &ShardId) -> Result<Option<String>, ArmorError> {
        self.read.current_version(shard_id)
    }

    pub fn load_columns(&self, shard_id: &ShardId, version: &str) -> Result<Vec<ColumnFile>, ArmorError> {
        let mut columns = Vec::new();
        for column_id in self.read.column_ids_at(shard_id, version)? {
            match self.read.load_column_at(shard_id, version, &column_id)? {
                Some(column) => columns.push(column),
                None => return Err(ArmorError::corrupted(layout::column_path(shard_id, version, &column_id), "listed column vanished")),
            }
        }
        Ok(columns)
    }

    pub fn write_column(&self, shard_id: &ShardId, version: &str, column: &ColumnFile) -> Result<(), ArmorError> {
        let path = layout::column_path(shard_id, version, &column.metadata.column_id());
        let bytes = column.encode(self.compression)?;
        debug!("Writing {} bytes to {}", bytes.len(), path);
        self.backend().write(&path, &bytes)
    }

    pub fn write_shard_metadata(&self, metadata: &ShardMetadata) -> Result<(), ArmorError> {
        let bytes = serde_json::to_vec_pretty(metadata)?;
        self.backend().write(&layout::shard_metadata_path(&metadata.shard_id, &metadata.version), &bytes)
    }

    /// Makes `version` the one readers resolve. Callers must have written every file of it first.
    pub fn publish(&self, shard_id: &ShardId, version: &str) -> Result<(), ArmorError> {
        let bytes = serde_json::to_vec(&CurrentPointer { current: version.to_string() })?;
        self.backend().replace(&layout::current_path(shard_id), &bytes)
    }
}
