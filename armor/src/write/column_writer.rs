use crate::entity::{EntityId, EntityRecord, Value, WriteRequest};
use crate::meta::ColumnMetadata;
use crate::schema::ColumnId;
use crate::shard::ShardId;
use crate::storage::column_file::ColumnFile;
use crate::ArmorError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// In-memory state of one column of a shard: the value store is append only, superseded
/// and deleted values stay behind as fragmented rows until the column gets compacted.
#[derive(Debug, Clone)]
pub struct ColumnWriter {
    column_id: ColumnId,
    records: BTreeMap<EntityId, EntityRecord>,
    tombstones: BTreeMap<EntityId, i64>,
    values: Vec<u8>,
    num_rows: usize,
    fragmented_rows: usize,
    compactions: u64,
    max_version: Option<i64>,
    last_updated: DateTime<Utc>,
    /// Versions written by the open transaction.
    touched: HashMap<EntityId, i64>,
    dirty: bool,
}

impl ColumnWriter {
    pub fn new(column_id: ColumnId) -> Self {
        Self {
            column_id,
            records: BTreeMap::new(),
            tombstones: BTreeMap::new(),
            values: Vec::new(),
            num_rows: 0,
            fragmented_rows: 0,
            compactions: 0,
            max_version: None,
            last_updated: Utc::now(),
            touched: HashMap::new(),
            dirty: false,
        }
    }

    pub fn from_file(file: ColumnFile) -> Self {
        let ColumnFile { metadata, records, tombstones, values } = file;
        Self {
            column_id: metadata.column_id(),
            records: records.into_iter().collect(),
            tombstones: tombstones.into_iter().collect(),
            values,
            num_rows: metadata.num_rows,
            fragmented_rows: metadata.fragmented_rows,
            compactions: metadata.compactions,
            max_version: metadata.max_version,
            last_updated: metadata.last_updated,
            touched: HashMap::new(),
            dirty: false,
        }
    }

    /// Id column of a table, one value per live entity.
    pub fn for_entities<'a>(column_id: ColumnId, entities: impl IntoIterator<Item = (&'a EntityId, &'a EntityRecord)>) -> Result<Self, ArmorError> {
        let mut writer = Self::new(column_id);
        for (entity_id, record) in entities {
            writer.append(entity_id.clone(), &entity_id.to_value(), record.version, &record.instance_id)?;
        }
        Ok(writer)
    }

    pub fn column_id(&self) -> &ColumnId {
        &self.column_id
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn records(&self) -> &BTreeMap<EntityId, EntityRecord> {
        &self.records
    }

    pub fn entity_records(&self) -> HashMap<EntityId, EntityRecord> {
        self.records.iter().map(|(id, r)| (id.clone(), r.clone())).collect()
    }

    /// Seeds the shard wide tombstones, keeping the newest version per entity.
    pub fn with_tombstones(mut self, tombstones: &BTreeMap<EntityId, i64>) -> Self {
        for (entity_id, version) in tombstones {
            let tombstone = self.tombstones.entry(entity_id.clone()).or_insert(*version);
            *tombstone = (*tombstone).max(*version);
        }
        self
    }

    pub fn tombstones(&self) -> &BTreeMap<EntityId, i64> {
        &self.tombstones
    }

    /// Returns whether the request was applied, stale versions are skipped.
    pub fn apply(&mut self, shard_id: &ShardId, request: &WriteRequest) -> Result<bool, ArmorError> {
        let entity_id = &request.entity_id;
        match self.touched.get(entity_id) {
            Some(&written) if request.version < written => {
                return Err(ArmorError::EntityOffset {
                    shard: shard_id.to_string(),
                    column: self.column_id.full_name(),
                    entity: entity_id.to_string(),
                    message: format!("version {} arrived after version {} in the same transaction", request.version, written),
                });
            }
            Some(_) => {}
            None => {
                if self.records.get(entity_id).is_some_and(|r| r.version > request.version) {
                    return Ok(false);
                }
                if self.tombstones.get(entity_id).is_some_and(|&deleted| deleted >= request.version) {
                    return Ok(false);
                }
            }
        }
        self.append(entity_id.clone(), &request.column.value, request.version, &request.instance_id)?;
        self.touched.insert(entity_id.clone(), request.version);
        Ok(true)
    }

    fn append(&mut self, entity_id: EntityId, value: &Value, version: i64, instance_id: &str) -> Result<(), ArmorError> {
        let bytes = bincode::serialize(value)?;
        let length = u32::try_from(bytes.len()).map_err(|_| ArmorError::EntityOffset {
            shard: String::new(),
            column: self.column_id.full_name(),
            entity: entity_id.to_string(),
            message: format!("value of {} bytes does not fit a record", bytes.len()),
        })?;
        let record = EntityRecord { offset: self.values.len() as u64, length, version, instance_id: instance_id.to_string() };
        self.values.extend(bytes);
        self.num_rows += 1;
        if self.records.insert(entity_id, record).is_some() {
            self.fragmented_rows += 1;
        }
        self.max_version = Some(self.max_version.map_or(version, |v| v.max(version)));
        self.last_updated = Utc::now();
        self.dirty = true;
        Ok(())
    }

    /// Tombstones the entity unless a newer version of it is already stored.
    pub fn delete(&mut self, entity_id: &EntityId, version: i64) -> bool {
        if self.records.get(entity_id).is_some_and(|r| r.version > version) {
            return false;
        }
        let tombstone = self.tombstones.entry(entity_id.clone()).or_insert(i64::MIN);
        if *tombstone < version {
            *tombstone = version;
            self.dirty = true;
        }
        let removed = self.records.remove(entity_id).is_some();
        if removed {
            self.fragmented_rows += 1;
            self.last_updated = Utc::now();
            self.dirty = true;
        }
        removed
    }

    pub fn needs_compaction(&self, trigger: usize) -> bool {
        trigger > 0 && self.fragmented_rows >= trigger
    }

    /// Rewrites the value store with live values only, records keep pointing at equal values.
    pub fn compact(&mut self) -> Result<(), ArmorError> {
        let old = std::mem::take(&mut self.values);
        let mut values = Vec::with_capacity(old.len());
        for (entity_id, record) in self.records.iter_mut() {
            let start = record.offset as usize;
            let slice = start.checked_add(record.length as usize).and_then(|end| old.get(start..end)).ok_or_else(|| ArmorError::EntityOffset {
                shard: String::new(),
                column: self.column_id.full_name(),
                entity: entity_id.to_string(),
                message: format!("record at {} of {} bytes outside value store of {} bytes", record.offset, record.length, old.len()),
            })?;
            record.offset = values.len() as u64;
            values.extend_from_slice(slice);
        }
        self.values = values;
        self.num_rows = self.records.len();
        self.fragmented_rows = 0;
        self.compactions += 1;
        self.dirty = true;
        Ok(())
    }

    pub fn metadata(&self) -> ColumnMetadata {
        ColumnMetadata {
            column_name: self.column_id.name.clone(),
            data_type: self.column_id.data_type,
            num_entities: self.records.len(),
            num_rows: self.num_rows,
            fragmented_rows: self.fragmented_rows,
            value_bytes: self.values.len() as u64,
            compactions: self.compactions,
            max_version: self.max_version,
            last_updated: self.last_updated,
        }
    }

    pub fn to_file(&self) -> ColumnFile {
        ColumnFile {
            metadata: self.metadata(),
            records: self.records.iter().map(|(id, r)| (id.clone(), r.clone())).collect(),
            tombstones: self.tombstones.iter().map(|(id, v)| (id.clone(), *v)).collect(),
            values: self.values.clone(),
        }
    }

    pub fn end_transaction(&mut self) {
        self.touched.clear();
        self.dirty = false;
    }
}

/// Rejects the request when its column or value is typed differently from the column.
pub fn check_request_type(shard_id: &ShardId, column_id: &ColumnId, request: &WriteRequest) -> Result<(), ArmorError> {
    let expected = column_id.data_type;
    let actual = match request.column.value.data_type() {
        Some(value_type) if value_type != expected => value_type,
        _ => request.column.column_id.data_type,
    };
    if actual != expected {
        return Err(ArmorError::ColumnTypeMismatch {
            shard: shard_id.to_string(),
            column: column_id.name.clone(),
            expected: expected.code(),
            actual: actual.code(),
        });
    }
    Ok(())
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use super::*;
    use crate::entity::Column;
    use crate::schema::DataType;

    fn shard() -> ShardId {
        ShardId::new("org1", "t1", "single", "1970-01-01T00:00:00Z", 0)
    }

    fn request(id: i64, version: i64, value: &str) -> WriteRequest {
        WriteRequest { entity_id: EntityId::from(id), version, instance_id: "i1".into(), column: Column::of("name", Value::String(value.into())) }
    }

    fn value_of(writer: &ColumnWriter, id: i64) -> Option<Value> {
        writer.to_file().value(&EntityId::from(id)).unwrap()
    }

    #[test]
    fn newest_version_wins_and_stale_writes_are_skipped() {
        let mut writer = ColumnWriter::new(ColumnId::new("name", DataType::String));
        assert!(writer.apply(&shard(), &request(1, 2, "b")).unwrap());
        assert!(writer.apply(&shard(), &request(1, 2, "c")).unwrap());
        writer.end_transaction();
        assert!(!writer.apply(&shard(), &request(1, 1, "a")).unwrap());
        assert_eq!(value_of(&writer, 1), Some(Value::String("c".into())));
        assert_eq!(writer.metadata().fragmented_rows, 1);
        assert_eq!(writer.metadata().max_version, Some(2));
    }

    #[test]
    fn regressing_within_a_transaction_is_an_offset_violation() {
        let mut writer = ColumnWriter::new(ColumnId::new("name", DataType::String));
        writer.apply(&shard(), &request(1, 5, "x")).unwrap();
        assert!(matches!(writer.apply(&shard(), &request(1, 4, "y")), Err(ArmorError::EntityOffset { .. })));
    }

    #[test]
    fn mistyped_values_are_rejected() {
        let writer = ColumnWriter::new(ColumnId::new("name", DataType::String));
        let mut bad = request(1, 1, "x");
        bad.column = Column::of("name", Value::Integer(3));
        assert!(matches!(check_request_type(&shard(), writer.column_id(), &bad), Err(ArmorError::ColumnTypeMismatch { expected: 'S', actual: 'I', .. })));
        check_request_type(&shard(), writer.column_id(), &request(1, 1, "x")).unwrap();
    }

    #[test]
    fn deletes_are_versioned() {
        let mut writer = ColumnWriter::new(ColumnId::new("name", DataType::String));
        writer.apply(&shard(), &request(1, 3, "x")).unwrap();
        writer.apply(&shard(), &request(2, 3, "y")).unwrap();
        writer.end_transaction();

        assert!(!writer.delete(&EntityId::from(1), 2));
        assert!(writer.delete(&EntityId::from(2), 4));
        assert!(writer.is_dirty());
        writer.end_transaction();
        assert!(!writer.apply(&shard(), &request(2, 4, "resurrected")).unwrap());
        assert!(writer.apply(&shard(), &request(2, 5, "back")).unwrap());
        assert_eq!(value_of(&writer, 1), Some(Value::String("x".into())));
        assert_eq!(value_of(&writer, 2), Some(Value::String("back".into())));
    }

    #[test]
    fn compaction_keeps_values_and_drops_fragments() {
        let mut writer = ColumnWriter::new(ColumnId::new("name", DataType::String));
        for version in 1..=5 {
            for id in 0..4 {
                writer.apply(&shard(), &request(id, version, &format!("{}-{}", id, version))).unwrap();
            }
            writer.end_transaction();
        }
        writer.delete(&EntityId::from(3), 9);
        let before = writer.to_file().values().unwrap();
        assert!(writer.needs_compaction(10));
        assert!(!writer.needs_compaction(0));

        writer.compact().unwrap();
        let file = writer.to_file();
        assert_eq!(file.values().unwrap(), before);
        assert_eq!(file.metadata.fragmented_rows, 0);
        assert_eq!(file.metadata.num_rows, 3);
        assert_eq!(file.metadata.compactions, 1);
        file.verify_offsets("s").unwrap();

        let reloaded = ColumnWriter::from_file(file);
        assert_eq!(reloaded.entity_records().len(), 3);
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn seeded_tombstones_block_stale_writes_on_new_columns() {
        let tombstones = BTreeMap::from([(EntityId::from(1), 4)]);
        let mut writer = ColumnWriter::new(ColumnId::new("name", DataType::String)).with_tombstones(&tombstones);
        assert!(!writer.is_dirty());
        assert!(!writer.apply(&shard(), &request(1, 3, "stale")).unwrap());
        assert!(writer.apply(&shard(), &request(1, 5, "newer")).unwrap());
        assert_eq!(writer.tombstones().get(&EntityId::from(1)), Some(&4));
        assert_eq!(value_of(&writer, 1), Some(Value::String("newer".into())));
    }

    #[test]
    fn compaction_rejects_records_pointing_past_the_value_store() {
        let mut writer = ColumnWriter::new(ColumnId::new("name", DataType::String));
        writer.apply(&shard(), &request(1, 1, "x")).unwrap();
        if let Some(record) = writer.records.get_mut(&EntityId::from(1)) {
            record.offset = u64::MAX;
            record.length = u32::MAX;
        }
        assert!(matches!(writer.compact(), Err(ArmorError::EntityOffset { .. })));
    }
}
