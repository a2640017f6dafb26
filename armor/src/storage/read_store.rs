use crate::interval::{format_instant, parse_instant, Interval, IntervalStrategy};
use crate::meta::{ShardMetadata, TableMetadata};
use crate::schema::ColumnId;
use crate::shard::ShardId;
use crate::storage::backend::StorageBackend;
use crate::storage::column_file::ColumnFile;
use crate::storage::layout;
use crate::storage::predicate::InstantPredicate;
use crate::{warn, ArmorError};
use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Content of a shard's `current` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPointer {
    pub current: String,
}

/// Navigates `tenant/table/interval/intervalStart/shardNum/version` on a backend.
/// Anything missing is an absent result, backend failures propagate.
#[derive(Clone)]
pub struct ReadStore {
    backend: Arc<dyn StorageBackend>,
}

impl ReadStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub(crate) fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ArmorError> {
        match self.backend.read(path)? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| ArmorError::corrupted(path, e)),
            None => Ok(None),
        }
    }

    pub fn find_shard_id(
        &self,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        shard_num: usize,
    ) -> Result<Option<ShardId>, ArmorError> {
        let shard_id = ShardId::for_timestamp(tenant, table, interval, timestamp, shard_num);
        Ok(self.backend.exists(&shard_id.path())?.then_some(shard_id))
    }

    pub fn find_shard_ids(&self, tenant: &str, table: &str, interval: Interval, timestamp: DateTime<Utc>) -> Result<BTreeSet<ShardId>, ArmorError> {
        let interval_start = interval.start(timestamp);
        let path = layout::interval_start_path(tenant, table, interval.interval_name(), &interval_start);
        let mut shard_ids = BTreeSet::new();
        for dir in self.backend.list_dirs(&path)? {
            match dir.parse::<usize>() {
                Ok(num) => {
                    shard_ids.insert(ShardId::new(tenant, table, interval.interval_name(), &interval_start, num));
                }
                Err(_) => debug!("Ignoring non shard directory {}/{}", path, dir),
            }
        }
        Ok(shard_ids)
    }

    /// Shards of the bucket whose current version holds a file starting with `column_prefix`.
    pub fn find_shard_ids_with_column(
        &self,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        column_prefix: &str,
    ) -> Result<Vec<ShardId>, ArmorError> {
        let mut found = Vec::new();
        for shard_id in self.find_shard_ids(tenant, table, interval, timestamp)? {
            if let Some(current) = self.resolve_current_path(&shard_id)? {
                if self.backend.list_files(&current)?.iter().any(|f| f.starts_with(column_prefix)) {
                    found.push(shard_id);
                }
            }
        }
        Ok(found)
    }

    pub fn current_version(&self, shard_id: &ShardId) -> Result<Option<String>, ArmorError> {
        Ok(self.read_json::<CurrentPointer>(&layout::current_path(shard_id))?.map(|p| p.current))
    }

    pub fn resolve_current_path(&self, shard_id: &ShardId) -> Result<Option<String>, ArmorError> {
        Ok(self.current_version(shard_id)?.map(|version| layout::version_path(shard_id, &version)))
    }

    pub fn get_column_ids(&self, shard_id: &ShardId) -> Result<Vec<ColumnId>, ArmorError> {
        match self.current_version(shard_id)? {
            Some(version) => self.column_ids_at(shard_id, &version),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn column_ids_at(&self, shard_id: &ShardId, version: &str) -> Result<Vec<ColumnId>, ArmorError> {
        let path = layout::version_path(shard_id, version);
        let mut column_ids = Vec::new();
        for file in self.backend.list_files(&path)? {
            if file.contains(layout::SHARD_METADATA) {
                continue;
            }
            match ColumnId::parse(&file) {
                Some(column_id) => column_ids.push(column_id),
                None => debug!("Ignoring unknown file {}/{}", path, file),
            }
        }
        Ok(column_ids)
    }

    /// Union of the columns over every shard of the bucket.
    pub fn get_column_ids_for(&self, tenant: &str, table: &str, interval: Interval, timestamp: DateTime<Utc>) -> Result<HashSet<ColumnId>, ArmorError> {
        let mut column_ids = HashSet::new();
        for shard_id in self.find_shard_ids(tenant, table, interval, timestamp)? {
            column_ids.extend(self.get_column_ids(&shard_id)?);
        }
        Ok(column_ids)
    }

    pub fn find_column_id(
        &self,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        column_name: &str,
    ) -> Result<Option<ColumnId>, ArmorError> {
        let wanted = column_name.to_lowercase();
        Ok(self.get_column_ids_for(tenant, table, interval, timestamp)?.into_iter().find(|c| c.name.to_lowercase() == wanted))
    }

    pub fn get_tenants(&self) -> Result<Vec<String>, ArmorError> {
        self.backend.list_dirs("")
    }

    pub fn get_tables(&self, tenant: &str) -> Result<Vec<String>, ArmorError> {
        self.backend.list_dirs(tenant)
    }

    pub fn get_shard_metadata(
        &self,
        tenant: &str,
        table: &str,
        interval: Interval,
        timestamp: DateTime<Utc>,
        shard_num: usize,
    ) -> Result<Option<ShardMetadata>, ArmorError> {
        self.load_shard_metadata(&ShardId::for_timestamp(tenant, table, interval, timestamp, shard_num))
    }

    pub fn load_shard_metadata(&self, shard_id: &ShardId) -> Result<Option<ShardMetadata>, ArmorError> {
        match self.current_version(shard_id)? {
            Some(version) => self.read_json(&layout::shard_metadata_path(shard_id, &version)),
            None => Ok(None),
        }
    }

    /// Buckets ever written below the interval directory, one level deep.
    pub fn get_interval_starts(&self, tenant: &str, table: &str, interval: Interval) -> Result<Vec<String>, ArmorError> {
        self.backend.list_dirs(&layout::interval_path(tenant, table, interval.interval_name()))
    }

    pub fn get_interval_starts_matching(
        &self,
        tenant: &str,
        table: &str,
        interval: Interval,
        predicate: &InstantPredicate,
    ) -> Result<Vec<String>, ArmorError> {
        let mut matches = Vec::new();
        for start in self.get_interval_starts(tenant, table, interval)? {
            match parse_instant(&start) {
                Some(instant) if predicate.test(&instant) => matches.push(format_instant(instant)),
                Some(_) => {}
                None => warn!("Skipping interval start {} of {}/{}/{}, not an instant", start, tenant, table, interval),
            }
        }
        Ok(matches)
    }

    pub fn load_table_metadata(&self, tenant: &str, table: &str) -> Result<Option<TableMetadata>, ArmorError> {
        self.read_json(&layout::table_metadata_path(tenant, table))
    }

    pub fn load_column(&self, shard_id: &ShardId, column_id: &ColumnId) -> Result<Option<ColumnFile>, ArmorError> {
        match self.current_version(shard_id)? {
            Some(version) => self.load_column_at(shard_id, &version, column_id),
            None => Ok(None),
        }
    }

    pub fn load_column_at(&self, shard_id: &ShardId, version: &str, column_id: &ColumnId) -> Result<Option<ColumnFile>, ArmorError> {
        let path = layout::column_path(shard_id, version, column_id);
        match self.backend.read(&path)? {
            Some(bytes) => ColumnFile::decode(&path, &bytes).map(Some),
            None => Ok(None),
        }
    }
}
