use crate::entity::{EntityId, EntityRecord, WriteRequest};
use crate::meta::{ColumnMetadata, ShardMetadata};
use crate::schema::ColumnId;
use crate::shard::ShardId;
use crate::storage::column_file::ColumnFile;
use crate::storage::layout;
use crate::storage::write_store::WriteStore;
use crate::write::column_writer::{check_request_type, ColumnWriter};
use crate::{error, info, warn, ArmorError};
use chrono::Utc;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Number of fragmented rows a column may accumulate before its next commit compacts it.
pub type CompactionTrigger = Arc<dyn Fn() -> usize + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Accepting writes for the next version.
    Open,
    /// Version files are being written.
    Flushing,
    /// The last commit swapped the current pointer, nothing pending.
    Published,
    Closed,
}

struct ShardInner {
    state: ShardState,
    base_version: Option<String>,
    metadata: Option<ShardMetadata>,
    /// Empty while released, see `ShardWriter::release`.
    columns: BTreeMap<String, ColumnWriter>,
    loaded: bool,
    /// Newest delete per entity over every column, new columns start from it.
    tombstones: BTreeMap<EntityId, i64>,
    pending_deletes: BTreeMap<EntityId, i64>,
    transaction: Option<String>,
    write_error: Option<ArmorError>,
}

fn merged_tombstones<'a>(files: impl IntoIterator<Item = &'a BTreeMap<EntityId, i64>>) -> BTreeMap<EntityId, i64> {
    let mut merged: BTreeMap<EntityId, i64> = BTreeMap::new();
    for tombstones in files {
        for (entity_id, version) in tombstones {
            let known = merged.entry(entity_id.clone()).or_insert(*version);
            *known = (*known).max(*version);
        }
    }
    merged
}

fn load_columns(shard_id: &ShardId, store: &WriteStore, version: &str) -> Result<(BTreeMap<String, ColumnWriter>, BTreeMap<EntityId, i64>), ArmorError> {
    let columns: BTreeMap<String, ColumnWriter> = store
        .load_columns(shard_id, version)?
        .into_iter()
        .map(|file: ColumnFile| (file.metadata.column_name.clone(), ColumnWriter::from_file(file)))
        .collect();
    let tombstones = merged_tombstones(columns.values().map(|c| c.tombstones()));
    Ok((columns, tombstones))
}

impl ShardInner {
    fn load(shard_id: &ShardId, store: &WriteStore) -> Result<Self, ArmorError> {
        let base_version = store.current_version(shard_id)?;
        let (columns, tombstones, metadata) = match &base_version {
            Some(version) => {
                let (columns, tombstones) = load_columns(shard_id, store, version)?;
                let metadata = store.read_store().read_json(&layout::shard_metadata_path(shard_id, version))?;
                (columns, tombstones, metadata)
            }
            None => (BTreeMap::new(), BTreeMap::new(), None),
        };
        let state = if base_version.is_some() { ShardState::Published } else { ShardState::Open };
        Ok(Self {
            state,
            base_version,
            metadata,
            columns,
            loaded: true,
            tombstones,
            pending_deletes: BTreeMap::new(),
            transaction: None,
            write_error: None,
        })
    }

    /// Brings back the column state of the base version after a release.
    fn ensure_loaded(&mut self, shard_id: &ShardId, store: &WriteStore) -> Result<(), ArmorError> {
        if self.loaded {
            return Ok(());
        }
        if let Some(version) = &self.base_version {
            let (columns, tombstones) = load_columns(shard_id, store, version)?;
            debug!("Reloaded {} columns of {} at version {}", columns.len(), shard_id, version);
            self.columns = columns;
            self.tombstones = tombstones;
        }
        self.loaded = true;
        Ok(())
    }

    fn has_pending(&self) -> bool {
        !self.pending_deletes.is_empty() || self.columns.values().any(|c| c.is_dirty())
    }

    fn begin(&mut self, shard_id: &ShardId, transaction: &str) -> Result<(), ArmorError> {
        if self.state == ShardState::Closed {
            return Err(ArmorError::ShardClosed(shard_id.to_string()));
        }
        match &self.transaction {
            Some(open) if open != transaction && self.has_pending() => Err(ArmorError::WriteTransaction(format!(
                "shard {} holds uncommitted changes of transaction {}, refusing {}",
                shard_id, open, transaction
            ))),
            _ => {
                self.transaction = Some(transaction.to_string());
                self.state = ShardState::Open;
                Ok(())
            }
        }
    }
}

/// Copy of a failure kept for the next commit, which reports it again.
fn replica(e: &ArmorError) -> ArmorError {
    match e {
        ArmorError::EntityOffset { shard, column, entity, message } => ArmorError::EntityOffset {
            shard: shard.clone(),
            column: column.clone(),
            entity: entity.clone(),
            message: message.clone(),
        },
        ArmorError::ColumnTypeMismatch { shard, column, expected, actual } => ArmorError::ColumnTypeMismatch {
            shard: shard.clone(),
            column: column.clone(),
            expected: *expected,
            actual: *actual,
        },
        ArmorError::WriteTransaction(message) => ArmorError::WriteTransaction(message.clone()),
        other => ArmorError::Custom(other.to_string()),
    }
}

/// Owns the mutable state of one shard. Writes only touch memory, `commit` materializes a
/// new immutable version directory and then swaps the shard's current pointer.
pub struct ShardWriter {
    shard_id: ShardId,
    store: WriteStore,
    compaction_trigger: CompactionTrigger,
    inner: Mutex<ShardInner>,
}

impl ShardWriter {
    /// Continues from the shard's published version, if any.
    pub fn open(shard_id: ShardId, store: WriteStore, compaction_trigger: CompactionTrigger) -> Result<Self, ArmorError> {
        let inner = ShardInner::load(&shard_id, &store)?;
        debug!("Opened shard {} at version {:?}", shard_id, inner.base_version);
        Ok(Self { shard_id, store, compaction_trigger, inner: Mutex::new(inner) })
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, ShardInner>, ArmorError> {
        Ok(self.inner.lock()?)
    }

    pub fn state(&self) -> Result<ShardState, ArmorError> {
        Ok(self.lock()?.state)
    }

    pub fn current_version(&self) -> Result<Option<String>, ArmorError> {
        Ok(self.lock()?.base_version.clone())
    }

    pub fn has_pending(&self) -> Result<bool, ArmorError> {
        Ok(self.lock()?.has_pending())
    }

    /// Whether the next commit has anything to publish or a failure to report.
    pub fn needs_commit(&self) -> Result<bool, ArmorError> {
        let inner = self.lock()?;
        Ok(inner.has_pending() || inner.write_error.is_some())
    }

    pub fn is_loaded(&self) -> Result<bool, ArmorError> {
        Ok(self.lock()?.loaded)
    }

    pub fn write(&self, transaction: &str, column_id: &ColumnId, requests: &[WriteRequest]) -> Result<(), ArmorError> {
        self.write_columns(transaction, &[(column_id.clone(), requests.to_vec())])
    }

    /// Applies the column groups of one unit of entities. Every request is type checked before
    /// the first one is applied; a failure while applying poisons the transaction, so the next
    /// commit drops everything it buffered.
    pub fn write_columns(&self, transaction: &str, groups: &[(ColumnId, Vec<WriteRequest>)]) -> Result<(), ArmorError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner.begin(&self.shard_id, transaction)?;
        inner.ensure_loaded(&self.shard_id, &self.store)?;
        let mut created: HashMap<&str, &ColumnId> = HashMap::new();
        for (column_id, requests) in groups {
            let expected = match inner.columns.get(&column_id.name) {
                Some(column) => column.column_id(),
                None => *created.entry(column_id.name.as_str()).or_insert(column_id),
            };
            for request in requests {
                check_request_type(&self.shard_id, expected, request)?;
            }
        }

        let ShardInner { columns, tombstones, write_error, .. } = inner;
        let tombstones = &*tombstones;
        for (column_id, requests) in groups {
            let column = columns.entry(column_id.name.clone()).or_insert_with(|| ColumnWriter::new(column_id.clone()).with_tombstones(tombstones));
            for request in requests {
                if let Err(e) = column.apply(&self.shard_id, request) {
                    error!("Shard {} rejected write of transaction {}: {}", self.shard_id, transaction, e);
                    *write_error = Some(replica(&e));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Records a tombstone applied to every column at commit.
    pub fn delete(&self, transaction: &str, entity_id: &EntityId, version: i64) -> Result<(), ArmorError> {
        let mut inner = self.lock()?;
        inner.begin(&self.shard_id, transaction)?;
        let pending = inner.pending_deletes.entry(entity_id.clone()).or_insert(version);
        *pending = (*pending).max(version);
        Ok(())
    }

    /// Publishes a new version holding every buffered change, `None` when the shard has
    /// neither pending changes nor a published version. A failed commit leaves the
    /// published version untouched and drops the pending changes.
    pub fn commit(&self, transaction: &str, entity_column_id: &ColumnId) -> Result<Option<ShardMetadata>, ArmorError> {
        let mut inner = self.lock()?;
        if inner.state == ShardState::Closed {
            return Err(ArmorError::ShardClosed(self.shard_id.to_string()));
        }
        if let Some(e) = inner.write_error.take() {
            self.reset(&mut inner);
            return Err(e);
        }
        if !inner.has_pending() {
            inner.transaction = None;
            if inner.base_version.is_some() {
                inner.state = ShardState::Published;
            }
            return Ok(inner.metadata.clone());
        }
        if let Some(open) = inner.transaction.as_deref().filter(|open| *open != transaction) {
            return Err(ArmorError::WriteTransaction(format!(
                "shard {} holds changes of transaction {}, cannot commit {}",
                self.shard_id, open, transaction
            )));
        }
        let published = self.store.current_version(&self.shard_id)?;
        if published != inner.base_version {
            let message = format!("current version of {} moved from {:?} to {:?}", self.shard_id, inner.base_version, published);
            self.reset(&mut inner);
            return Err(ArmorError::WriteTransaction(message));
        }

        inner.state = ShardState::Flushing;
        let flushed = inner.ensure_loaded(&self.shard_id, &self.store).and_then(|_| self.flush(&mut inner, transaction, entity_column_id));
        match flushed {
            Ok(Some(metadata)) => {
                inner.base_version = Some(metadata.version.clone());
                inner.metadata = Some(metadata.clone());
                inner.transaction = None;
                inner.pending_deletes.clear();
                inner.columns.values_mut().for_each(|c| c.end_transaction());
                inner.state = ShardState::Published;
                Ok(Some(metadata))
            }
            Ok(None) => {
                inner.transaction = None;
                inner.pending_deletes.clear();
                inner.columns.values_mut().for_each(|c| c.end_transaction());
                inner.state = if inner.base_version.is_some() { ShardState::Published } else { ShardState::Open };
                Ok(inner.metadata.clone())
            }
            Err(e) => {
                error!("Commit of {} in transaction {} failed: {}", self.shard_id, transaction, e);
                self.reset(&mut inner);
                Err(e)
            }
        }
    }

    fn flush(&self, inner: &mut ShardInner, transaction: &str, entity_column_id: &ColumnId) -> Result<Option<ShardMetadata>, ArmorError> {
        let start = Instant::now();
        let deletes = std::mem::take(&mut inner.pending_deletes);
        let mut tombstoned = false;
        for (entity_id, version) in &deletes {
            let tombstone = inner.tombstones.entry(entity_id.clone()).or_insert(i64::MIN);
            if *tombstone < *version {
                *tombstone = *version;
                tombstoned = true;
            }
            for column in inner.columns.values_mut() {
                column.delete(entity_id, *version);
            }
        }
        if !tombstoned && !inner.columns.values().any(|c| c.is_dirty()) {
            return Ok(None);
        }

        inner.columns.remove(&entity_column_id.name);
        let mut live: BTreeMap<&EntityId, &EntityRecord> = BTreeMap::new();
        for column in inner.columns.values() {
            for (entity_id, record) in column.records() {
                let newer = live.get(entity_id).map_or(true, |known| record.version > known.version);
                if newer {
                    live.insert(entity_id, record);
                }
            }
        }
        // the id column carries every tombstone of the shard into the next version
        let entity_column = ColumnWriter::for_entities(entity_column_id.clone(), live)?.with_tombstones(&inner.tombstones);
        inner.columns.insert(entity_column_id.name.clone(), entity_column);

        let trigger = (self.compaction_trigger)();
        for column in inner.columns.values_mut() {
            if column.needs_compaction(trigger) {
                let fragmented = column.metadata().fragmented_rows;
                column.compact()?;
                info!("Compacted {} of {}, dropped {} fragmented rows", column.column_id(), self.shard_id, fragmented);
            }
        }

        let version = uuid::Uuid::new_v4().to_string();
        let shard = self.shard_id.to_string();
        let mut column_metadata = Vec::with_capacity(inner.columns.len());
        for column in inner.columns.values() {
            let file = column.to_file();
            file.verify_offsets(&shard)?;
            self.store.write_column(&self.shard_id, &version, &file)?;
            column_metadata.push(file.metadata);
        }
        let metadata = ShardMetadata {
            shard_id: self.shard_id.clone(),
            version: version.clone(),
            transaction: transaction.to_string(),
            committed_at: Utc::now(),
            column_metadata,
        };
        self.store.write_shard_metadata(&metadata)?;
        let write_took = start.elapsed().as_millis();
        self.store.publish(&self.shard_id, &version)?;
        info!(
            "Committed {} version {} with {} columns : write {} ms, publish {} ms",
            self.shard_id,
            version,
            metadata.column_metadata.len(),
            write_took,
            start.elapsed().as_millis() - write_took
        );
        Ok(Some(metadata))
    }

    /// Drops pending changes and continues from what is published.
    fn reset(&self, inner: &mut ShardInner) {
        match ShardInner::load(&self.shard_id, &self.store) {
            Ok(fresh) => *inner = fresh,
            Err(e) => {
                error!("Shard {} cannot reload its published version, closing it: {}", self.shard_id, e);
                inner.columns.clear();
                inner.pending_deletes.clear();
                inner.state = ShardState::Closed;
            }
        }
    }

    /// Frees the column state of a published shard with nothing pending, the next write or
    /// commit reloads it from the base version. Returns the published manifest either way.
    pub fn release(&self) -> Result<Option<ShardMetadata>, ArmorError> {
        let mut inner = self.lock()?;
        if inner.state == ShardState::Closed {
            return Err(ArmorError::ShardClosed(self.shard_id.to_string()));
        }
        if inner.has_pending() || inner.write_error.is_some() {
            return Ok(inner.metadata.clone());
        }
        inner.transaction = None;
        if inner.base_version.is_some() {
            inner.state = ShardState::Published;
        }
        if inner.state == ShardState::Published && inner.loaded {
            inner.columns.clear();
            inner.tombstones.clear();
            inner.loaded = false;
            debug!("Released column state of {}", self.shard_id);
        }
        Ok(inner.metadata.clone())
    }

    /// Safe to call repeatedly, uncommitted changes are discarded.
    pub fn close(&self) -> Result<(), ArmorError> {
        let mut inner = self.lock()?;
        if inner.state == ShardState::Closed {
            return Ok(());
        }
        if inner.has_pending() {
            warn!("Closing {} with uncommitted changes of transaction {:?}", self.shard_id, inner.transaction);
        }
        inner.columns.clear();
        inner.tombstones.clear();
        inner.pending_deletes.clear();
        inner.state = ShardState::Closed;
        Ok(())
    }

    pub fn entity_records(&self, column_name: &str) -> Result<Option<HashMap<EntityId, EntityRecord>>, ArmorError> {
        let mut inner = self.lock()?;
        if inner.state != ShardState::Closed {
            inner.ensure_loaded(&self.shard_id, &self.store)?;
        }
        Ok(inner.columns.get(column_name).map(|c| c.entity_records()))
    }

    pub fn column_metadata(&self, column_name: &str) -> Result<Option<ColumnMetadata>, ArmorError> {
        let mut inner = self.lock()?;
        if inner.state != ShardState::Closed {
            inner.ensure_loaded(&self.shard_id, &self.store)?;
        }
        Ok(inner.columns.get(column_name).map(|c| c.metadata()))
    }
}
