use crate::entity::{EntityId, EntityRecord, Value};
use crate::meta::ColumnMetadata;
use crate::shard::ShardId;
use crate::storage::column_file::ColumnFile;
use crate::ArmorError;
use std::collections::{BTreeMap, HashMap};

/// A column of one shard as published by a single version.
#[derive(Debug, Clone)]
pub struct ShardColumn {
    shard_id: ShardId,
    version: String,
    file: ColumnFile,
}

impl ShardColumn {
    pub fn new(shard_id: ShardId, version: String, file: ColumnFile) -> Self {
        Self { shard_id, version, file }
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &ColumnMetadata {
        &self.file.metadata
    }

    pub fn entity_records(&self) -> HashMap<EntityId, EntityRecord> {
        self.file.entity_records()
    }

    pub fn value(&self, entity_id: &EntityId) -> Result<Option<Value>, ArmorError> {
        self.file.value(entity_id)
    }

    pub fn values(&self) -> Result<BTreeMap<EntityId, Value>, ArmorError> {
        self.file.values()
    }
}
