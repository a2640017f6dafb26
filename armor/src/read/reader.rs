use crate::entity::{EntityId, Value};
use crate::interval::Interval;
use crate::meta::ColumnMetadata;
use crate::read::shard_column::ShardColumn;
use crate::shard::ShardId;
use crate::storage::read_store::ReadStore;
use crate::ArmorError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Read side entry point. Every lookup resolves the current pointer once and reads only
/// from the version it names, so a concurrent commit is either fully visible or not at all.
#[derive(Clone)]
pub struct ArmorReader {
    store: ReadStore,
}

impl ArmorReader {
    pub fn new(store: ReadStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ReadStore {
        &self.store
    }

    pub fn shard_column(&self, shard_id: &ShardId, column_name: &str) -> Result<Option<ShardColumn>, ArmorError> {
        let Some(version) = self.store.current_version(shard_id)? else {
            return Ok(None);
        };
        let Some(column_id) = self.store.column_ids_at(shard_id, &version)?.into_iter().find(|c| c.name == column_name) else {
            return Ok(None);
        };
        Ok(self
            .store
            .load_column_at(shard_id, &version, &column_id)?
            .map(|file| ShardColumn::new(shard_id.clone(), version, file)))
    }

    pub fn column(
        &self,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        column_name: &str,
        shard_num: usize,
    ) -> Result<Option<ShardColumn>, ArmorError> {
        match self.store.find_shard_id(tenant, table, interval, timestamp, shard_num)? {
            Some(shard_id) => self.shard_column(&shard_id, column_name),
            None => Ok(None),
        }
    }

    pub fn column_metadata(
        &self,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        column_name: &str,
        shard_num: usize,
    ) -> Result<Option<ColumnMetadata>, ArmorError> {
        Ok(self.column(tenant, table, interval, timestamp, column_name, shard_num)?.map(|c| c.metadata().clone()))
    }

    /// Values of a column over every shard of the bucket holding `timestamp`.
    pub fn column_values(
        &self,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        column_name: &str,
    ) -> Result<BTreeMap<EntityId, Value>, ArmorError> {
        let mut values = BTreeMap::new();
        for shard_id in self.store.find_shard_ids(tenant, table, interval, timestamp)? {
            if let Some(column) = self.shard_column(&shard_id, column_name)? {
                values.extend(column.values()?);
            }
        }
        Ok(values)
    }
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::storage::compression::Compression;
    use crate::storage::partitioning::Xxh3Router;
    use crate::storage::test_utils::backends;
    use crate::storage::write_store::WriteStore;
    use crate::write::armor_writer::ArmorWriter;
    use std::sync::Arc;

    #[test]
    fn reads_what_was_committed() {
        for backend in backends("reader") {
            let store = WriteStore::new(backend.clone(), Arc::new(Xxh3Router::new(3)), Compression::Zstd);
            let writer = ArmorWriter::new("reader-test", store, 2).unwrap();
            let ts = Utc::now();
            let entities: Vec<Entity> = (0..30i64).map(|i| Entity::new("id", i, 1, "i1").with_column("score", Value::Double(i as f64 / 2.0))).collect();
            writer.write("tx", "org1", "scores", Interval::Daily, ts, entities).unwrap();
            writer.commit("tx", "org1", "scores").unwrap().unwrap();
            writer.close().unwrap();

            let reader = ArmorReader::new(ReadStore::new(backend.clone()));
            let values = reader.column_values("org1", "scores", Interval::Daily, ts, "score").unwrap();
            assert_eq!(values.len(), 30);
            assert_eq!(values.get(&EntityId::from(7)), Some(&Value::Double(3.5)));
            assert!(reader.column_values("org1", "scores", Interval::Daily, ts, "missing").unwrap().is_empty());
            assert!(reader.column_values("org1", "scores", Interval::Weekly, ts, "score").unwrap().is_empty());

            let per_shard: usize = (0..3)
                .filter_map(|n| reader.column_metadata("org1", "scores", Interval::Daily, ts, "score", n).unwrap())
                .map(|m| m.num_entities)
                .sum();
            assert_eq!(per_shard, 30);
            assert!(reader.column("org1", "scores", Interval::Daily, ts, "score", 9).unwrap().is_none());
        }
    }
}
