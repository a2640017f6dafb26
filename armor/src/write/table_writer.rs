use crate::meta::{ShardMetadata, TableMetadata};
use crate::schema::ColumnId;
use crate::shard::{ShardId, TableId};
use crate::write::shard_writer::ShardWriter;
use crate::{warn, ArmorError};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Map of lazily created writers. The map lock only guards the slots, `create` runs on the
/// slot of its own key, so opening one writer never blocks callers of another.
struct Slots<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
}

impl<K: Hash + Eq + Clone + Ord, T> Slots<K, T> {
    fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    fn get_or_try_init<F>(&self, key: &K, create: F) -> Result<Arc<T>, ArmorError>
    where
        F: FnOnce() -> Result<T, ArmorError>,
    {
        let slot = self.slots.lock()?.entry(key.clone()).or_default().clone();
        let created = slot.get_or_try_init(|| create().map(Arc::new)).cloned();
        if created.is_err() {
            // drop the empty slot unless a concurrent caller filled it meanwhile
            let mut slots = self.slots.lock()?;
            if slots.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot) && s.get().is_none()) {
                slots.remove(key);
            }
        }
        created
    }

    fn get(&self, key: &K) -> Result<Option<Arc<T>>, ArmorError> {
        Ok(self.slots.lock()?.get(key).and_then(|slot| slot.get().cloned()))
    }

    /// Created values sorted by key.
    fn values(&self) -> Result<Vec<(K, Arc<T>)>, ArmorError> {
        let mut values: Vec<(K, Arc<T>)> =
            self.slots.lock()?.iter().filter_map(|(key, slot)| slot.get().map(|value| (key.clone(), value.clone()))).collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(values)
    }

    fn drain(&self) -> Result<Vec<Arc<T>>, ArmorError> {
        Ok(self.slots.lock()?.drain().filter_map(|(_, slot)| slot.get().cloned()).collect())
    }
}

/// Shard writers of one table, created lazily and at most once per shard id.
pub struct TableWriter {
    table_id: TableId,
    entity_column_id: ColumnId,
    shards: Slots<ShardId, ShardWriter>,
}

impl TableWriter {
    pub fn new(table_id: TableId, entity_column_id: ColumnId) -> Self {
        Self { table_id, entity_column_id, shards: Slots::new() }
    }

    /// Takes over the entity id column fixed by an earlier commit.
    pub fn from_metadata(table_id: TableId, metadata: &TableMetadata) -> Result<Self, ArmorError> {
        let entity_column_id = metadata.entity_column().ok_or_else(|| {
            ArmorError::corrupted(
                format!("{}/table-metadata", table_id),
                format!("unknown entity id type {}", metadata.entity_column_id_type),
            )
        })?;
        Ok(Self::new(table_id, entity_column_id))
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    pub fn entity_column_id(&self) -> &ColumnId {
        &self.entity_column_id
    }

    /// Concurrent callers of one shard id share a single writer, `create` runs once per shard.
    pub fn get_or_create_shard<F>(&self, shard_id: &ShardId, create: F) -> Result<Arc<ShardWriter>, ArmorError>
    where
        F: FnOnce() -> Result<ShardWriter, ArmorError>,
    {
        self.shards.get_or_try_init(shard_id, create)
    }

    pub fn get_shard(&self, shard_id: &ShardId) -> Result<Option<Arc<ShardWriter>>, ArmorError> {
        self.shards.get(shard_id)
    }

    /// Loaded writers with the given shard number, one per interval bucket.
    pub fn shards_by_num(&self, shard_num: usize) -> Result<Vec<Arc<ShardWriter>>, ArmorError> {
        Ok(self.shards.values()?.into_iter().filter(|(id, _)| id.shard_num == shard_num).map(|(_, w)| w).collect())
    }

    pub fn shard_writers(&self) -> Result<Vec<Arc<ShardWriter>>, ArmorError> {
        Ok(self.shards.values()?.into_iter().map(|(_, w)| w).collect())
    }

    pub fn to_table_metadata(&self, mut shard_metadata: Vec<ShardMetadata>) -> TableMetadata {
        shard_metadata.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));
        let mut metadata = TableMetadata::new(&self.entity_column_id);
        metadata.shard_metadata = shard_metadata;
        metadata
    }

    /// Best effort: a failing shard is logged and the others are still closed.
    pub fn close(&self) -> Result<(), ArmorError> {
        for writer in self.shards.drain()? {
            if let Err(e) = writer.close() {
                warn!("Unable to close shard writer {}: {}", writer.shard_id(), e);
            }
        }
        Ok(())
    }
}

/// Table writers of one writer process keyed by tenant and table.
pub struct WriterRegistry {
    tables: Slots<TableId, TableWriter>,
}

impl Default for WriterRegistry {
    fn default() -> Self {
        Self { tables: Slots::new() }
    }
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table_id: &TableId) -> Result<Option<Arc<TableWriter>>, ArmorError> {
        self.tables.get(table_id)
    }

    pub fn get_or_try_create<F>(&self, table_id: &TableId, create: F) -> Result<Arc<TableWriter>, ArmorError>
    where
        F: FnOnce() -> Result<TableWriter, ArmorError>,
    {
        self.tables.get_or_try_init(table_id, create)
    }

    pub fn tables(&self) -> Result<Vec<TableId>, ArmorError> {
        Ok(self.tables.values()?.into_iter().map(|(id, _)| id).collect())
    }

    pub fn close_all(&self) -> Result<(), ArmorError> {
        for writer in self.tables.drain()? {
            if let Err(e) = writer.close() {
                warn!("Unable to close table writer {}: {}", writer.table_id(), e);
            }
        }
        Ok(())
    }
}
