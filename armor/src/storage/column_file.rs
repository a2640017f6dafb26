use crate::entity::{EntityId, EntityRecord, Value};
use crate::meta::ColumnMetadata;
use crate::storage::compression::Compression;
use crate::ArmorError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Physical content of one column inside a shard version: the entity records index into
/// `values`, a store of bincode encoded values. Deleted entities keep a tombstone so that
/// older writes arriving later cannot bring them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFile {
    pub metadata: ColumnMetadata,
    pub records: Vec<(EntityId, EntityRecord)>,
    pub tombstones: Vec<(EntityId, i64)>,
    pub values: Vec<u8>,
}

impl ColumnFile {
    pub fn encode(&self, compression: Compression) -> Result<Vec<u8>, ArmorError> {
        compression.encode(&bincode::serialize(self)?)
    }

    pub fn decode(path: &str, bytes: &[u8]) -> Result<ColumnFile, ArmorError> {
        let raw = Compression::decode(path, bytes)?;
        bincode::deserialize(&raw).map_err(|e| ArmorError::corrupted(path, e))
    }

    fn value_at(&self, record: &EntityRecord) -> Result<Value, ArmorError> {
        let start = record.offset as usize;
        let slice = start
            .checked_add(record.length as usize)
            .and_then(|end| self.values.get(start..end))
            .ok_or_else(|| {
                ArmorError::corrupted(&self.metadata.column_name, format!("record at {} of {} bytes outside value store", record.offset, record.length))
            })?;
        Ok(bincode::deserialize(slice)?)
    }

    pub fn value(&self, entity_id: &EntityId) -> Result<Option<Value>, ArmorError> {
        match self.records.iter().find(|(id, _)| id == entity_id) {
            Some((_, record)) => self.value_at(record).map(Some),
            None => Ok(None),
        }
    }

    pub fn values(&self) -> Result<BTreeMap<EntityId, Value>, ArmorError> {
        self.records.iter().map(|(id, record)| Ok((id.clone(), self.value_at(record)?))).collect()
    }

    pub fn entity_records(&self) -> HashMap<EntityId, EntityRecord> {
        self.records.iter().cloned().collect()
    }

    /// Every record must lie inside the value store and no two records may share bytes.
    pub fn verify_offsets(&self, shard: &str) -> Result<(), ArmorError> {
        let mut spans: Vec<(&EntityId, u64, Option<u64>)> =
            self.records.iter().map(|(id, r)| (id, r.offset, r.offset.checked_add(r.length as u64))).collect();
        spans.sort_by_key(|(_, start, _)| *start);
        let limit = self.values.len() as u64;
        let mut previous_end = 0u64;
        for (id, start, end) in spans {
            let Some(end) = end else {
                return Err(ArmorError::EntityOffset {
                    shard: shard.to_string(),
                    column: self.metadata.column_id().full_name(),
                    entity: id.to_string(),
                    message: format!("record at {} overflows the offset range", start),
                });
            };
            let message = if end > limit {
                Some(format!("record {}..{} exceeds value store of {} bytes", start, end, limit))
            } else if start < previous_end {
                Some(format!("record at {} overlaps previous record ending at {}", start, previous_end))
            } else {
                None
            };
            if let Some(message) = message {
                return Err(ArmorError::EntityOffset {
                    shard: shard.to_string(),
                    column: self.metadata.column_id().full_name(),
                    entity: id.to_string(),
                    message,
                });
            }
            previous_end = end;
        }
        Ok(())
    }
}
