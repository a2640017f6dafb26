use crate::entity::{Entity, EntityId, EntityRecord, WriteRequest};
use crate::interval::Interval;
use crate::logger::tenant_scope;
use crate::meta::{ColumnMetadata, ShardMetadata, TableMetadata};
use crate::schema::ColumnId;
use crate::settings::ArmorConfig;
use crate::shard::{ShardId, TableId};
use crate::storage::partitioning::Xxh3Router;
use crate::storage::write_store::WriteStore;
use crate::write::capture::{CapturedWrite, WriteCapture};
use crate::write::pool::{settle, TaskGroup, WorkerPool};
use crate::write::shard_writer::{CompactionTrigger, ShardWriter};
use crate::write::table_writer::{TableWriter, WriterRegistry};
use crate::{info, warn, ArmorError};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_COMPACTION_TRIGGER: usize = 50;

/// Entry point of the write path: routes entities to shards, runs one unit of work per
/// shard on the pool and persists the table manifest on commit.
pub struct ArmorWriter {
    name: String,
    store: WriteStore,
    pool: Arc<WorkerPool>,
    owns_pool: bool,
    registry: Arc<WriterRegistry>,
    compaction_trigger: CompactionTrigger,
    capture: Option<Arc<dyn WriteCapture>>,
}

impl ArmorWriter {
    /// Writer owning a pool of `threads` workers, shut down by `close`.
    pub fn new(name: &str, store: WriteStore, threads: usize) -> Result<Self, ArmorError> {
        let pool = Arc::new(WorkerPool::new(name, threads)?);
        let mut writer = Self::with_pool(name, store, pool, Arc::new(WriterRegistry::new()));
        writer.owns_pool = true;
        Ok(writer)
    }

    /// Writer running on a pool and registry owned by the caller.
    pub fn with_pool(name: &str, store: WriteStore, pool: Arc<WorkerPool>, registry: Arc<WriterRegistry>) -> Self {
        Self {
            name: name.to_string(),
            store,
            pool,
            owns_pool: false,
            registry,
            compaction_trigger: Arc::new(|| DEFAULT_COMPACTION_TRIGGER),
            capture: None,
        }
    }

    pub fn from_config(config: &ArmorConfig) -> Result<Self, ArmorError> {
        let settings = &config.writer;
        let router = Arc::new(Xxh3Router::new(settings.shard_count.max(1)));
        let store = WriteStore::new(config.backend()?, router, settings.compression);
        let trigger = settings.compaction_trigger;
        let writer = Self::new(&settings.name, store, settings.parallelism.into())?.with_compaction_trigger(Arc::new(move || trigger));
        info!(
            "Writer {} on {} backend with {} shards, {} workers, {} compression",
            settings.name,
            writer.store.backend().name(),
            settings.shard_count,
            writer.pool.size(),
            settings.compression
        );
        Ok(writer)
    }

    pub fn with_compaction_trigger(mut self, trigger: CompactionTrigger) -> Self {
        self.compaction_trigger = trigger;
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn WriteCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &WriteStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<WriterRegistry> {
        &self.registry
    }

    pub fn start_transaction(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn shard_opener(&self, shard_id: &ShardId) -> impl FnOnce() -> Result<ShardWriter, ArmorError> {
        let (shard_id, store, trigger) = (shard_id.clone(), self.store.clone(), self.compaction_trigger.clone());
        move || ShardWriter::open(shard_id, store, trigger)
    }

    fn captured(&self, transaction: &str, shard_id: &ShardId, write: CapturedWrite<'_>) {
        if let Some(capture) = &self.capture {
            if capture.should_capture(shard_id, &self.name) {
                capture.capture(transaction, shard_id, write);
            }
        }
    }

    fn ensure_entity_type(table_writer: &TableWriter, entity_id: &EntityId) -> Result<(), ArmorError> {
        let expected = table_writer.entity_column_id().data_type;
        if entity_id.data_type() != expected {
            return Err(ArmorError::EntityIdTypeMismatch {
                table: table_writer.table_id().to_string(),
                expected: expected.code(),
                actual: entity_id.data_type().code(),
            });
        }
        Ok(())
    }

    /// The table's entity id column comes from its persisted manifest, an unseen table
    /// takes it from the first entity written to it.
    fn table_writer_for(&self, table_id: &TableId, first: &Entity) -> Result<Arc<TableWriter>, ArmorError> {
        self.registry.get_or_try_create(table_id, || match self.store.load_table_metadata(&table_id.tenant, &table_id.table)? {
            Some(metadata) => TableWriter::from_metadata(table_id.clone(), &metadata),
            None => {
                debug!("Table {} is new, entity id column {}", table_id, first.entity_column_id());
                Ok(TableWriter::new(table_id.clone(), first.entity_column_id()))
            }
        })
    }

    pub fn write(
        &self,
        transaction: &str,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        entities: Vec<Entity>,
    ) -> Result<(), ArmorError> {
        let Some(first) = entities.first() else {
            return Ok(());
        };
        let _scope = tenant_scope(tenant);
        let table_id = TableId::new(tenant, table);
        let table_writer = self.table_writer_for(&table_id, first)?;
        for entity in &entities {
            Self::ensure_entity_type(&table_writer, &entity.entity_id)?;
        }

        let mut by_shard: BTreeMap<ShardId, Vec<Entity>> = BTreeMap::new();
        for entity in entities {
            let shard_id = self.store.find_shard_id(tenant, table, interval, timestamp, &entity.entity_id);
            by_shard.entry(shard_id).or_default().push(entity);
        }

        let start = Instant::now();
        let shard_count = by_shard.len();
        let mut group = TaskGroup::new(&self.pool);
        for (shard_id, entities) in by_shard {
            self.captured(transaction, &shard_id, CapturedWrite::Entities(&entities));
            let open = self.shard_opener(&shard_id);
            let (table_writer, transaction, tenant) = (table_writer.clone(), transaction.to_string(), tenant.to_string());
            group.submit(move || {
                let _scope = tenant_scope(&tenant);
                let shard = table_writer.get_or_create_shard(&shard_id, open)?;
                let mut by_column: BTreeMap<String, (ColumnId, Vec<WriteRequest>)> = BTreeMap::new();
                for request in entities.into_iter().flat_map(Entity::into_write_requests) {
                    by_column
                        .entry(request.column.column_id.name.clone())
                        .or_insert_with(|| (request.column.column_id.clone(), Vec::new()))
                        .1
                        .push(request);
                }
                let groups: Vec<(ColumnId, Vec<WriteRequest>)> = by_column.into_values().collect();
                shard.write_columns(&transaction, &groups)
            });
        }
        settle(group.join(), false)?;
        debug!("Transaction {} wrote {} shards of {} in {} ms", transaction, shard_count, table_id, start.elapsed().as_millis());
        Ok(())
    }

    /// Deleting from a table this writer has not loaded yet goes through its persisted
    /// manifest, a table that was never committed has nothing to delete.
    #[allow(clippy::too_many_arguments)]
    pub fn delete(
        &self,
        transaction: &str,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        entity_id: impl Into<EntityId>,
        version: i64,
        instance_id: &str,
    ) -> Result<(), ArmorError> {
        let _scope = tenant_scope(tenant);
        let entity_id = entity_id.into();
        let table_id = TableId::new(tenant, table);
        let table_writer = match self.registry.get(&table_id)? {
            Some(table_writer) => table_writer,
            None => match self.store.load_table_metadata(tenant, table)? {
                Some(metadata) => self.registry.get_or_try_create(&table_id, || TableWriter::from_metadata(table_id.clone(), &metadata))?,
                None => {
                    debug!("Ignoring delete of {} from unknown table {}", entity_id, table_id);
                    return Ok(());
                }
            },
        };
        Self::ensure_entity_type(&table_writer, &entity_id)?;
        let shard_id = self.store.find_shard_id(tenant, table, interval, timestamp, &entity_id);
        self.captured(transaction, &shard_id, CapturedWrite::Delete { entity_id: &entity_id, version, instance_id });
        let shard = table_writer.get_or_create_shard(&shard_id, self.shard_opener(&shard_id))?;
        shard.delete(transaction, &entity_id, version)
    }

    /// Commits the shards of the table holding changes concurrently and saves the table
    /// manifest, `None` when the writer never touched the table. Idle shards keep their
    /// published version and release their column state.
    pub fn commit(&self, transaction: &str, tenant: &str, table: &str) -> Result<Option<TableMetadata>, ArmorError> {
        let _scope = tenant_scope(tenant);
        let table_id = TableId::new(tenant, table);
        let Some(table_writer) = self.registry.get(&table_id)? else {
            return Ok(None);
        };
        let shards = table_writer.shard_writers()?;
        if shards.is_empty() {
            return Ok(None);
        }

        let start = Instant::now();
        let mut committed: Vec<ShardMetadata> = Vec::new();
        let mut group: TaskGroup<Option<ShardMetadata>> = TaskGroup::new(&self.pool);
        for shard in shards {
            let idle = match shard.needs_commit() {
                Ok(needs_commit) => !needs_commit,
                Err(e) if e.is_benign() => continue,
                Err(e) => return Err(e),
            };
            if idle {
                match shard.release() {
                    Ok(published) => committed.extend(published),
                    Err(e) if e.is_benign() => warn!("Skipping {} in commit of {}: {}", shard.shard_id(), transaction, e),
                    Err(e) => return Err(e),
                }
                continue;
            }
            let (transaction, tenant, entity_column_id) = (transaction.to_string(), tenant.to_string(), table_writer.entity_column_id().clone());
            group.submit(move || {
                let _scope = tenant_scope(&tenant);
                shard.commit(&transaction, &entity_column_id)
            });
        }
        committed.extend(settle(group.join(), true)?.into_iter().flatten());
        if committed.is_empty() {
            warn!("Transaction {} committed nothing to {}", transaction, table_id);
            return Ok(None);
        }
        let metadata = table_writer.to_table_metadata(committed);
        self.store.save_table_metadata(tenant, table, &metadata)?;
        info!(
            "Transaction {} committed {} shards of {} in {} ms",
            transaction,
            metadata.shard_metadata.len(),
            table_id,
            start.elapsed().as_millis()
        );
        Ok(Some(metadata))
    }

    /// In-memory records of a column for every loaded bucket with the given shard number.
    pub fn column_entity_records(
        &self,
        tenant: &str,
        table: &str,
        column_name: &str,
        shard_num: usize,
    ) -> Result<BTreeMap<ShardId, HashMap<EntityId, EntityRecord>>, ArmorError> {
        let mut out = BTreeMap::new();
        if let Some(table_writer) = self.registry.get(&TableId::new(tenant, table))? {
            for shard in table_writer.shards_by_num(shard_num)? {
                if let Some(records) = shard.entity_records(column_name)? {
                    out.insert(shard.shard_id().clone(), records);
                }
            }
        }
        Ok(out)
    }

    pub fn column_metadata(&self, tenant: &str, table: &str, column_name: &str, shard_num: usize) -> Result<BTreeMap<ShardId, ColumnMetadata>, ArmorError> {
        let mut out = BTreeMap::new();
        if let Some(table_writer) = self.registry.get(&TableId::new(tenant, table))? {
            for shard in table_writer.shards_by_num(shard_num)? {
                if let Some(metadata) = shard.column_metadata(column_name)? {
                    out.insert(shard.shard_id().clone(), metadata);
                }
            }
        }
        Ok(out)
    }

    /// Closes every shard writer, and the pool when this writer owns it.
    pub fn close(&self) -> Result<(), ArmorError> {
        info!("Closing writer {}", self.name);
        self.registry.close_all()?;
        if self.owns_pool {
            self.pool.shutdown()?;
        }
        Ok(())
    }
}
