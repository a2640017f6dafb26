use crate::interval::{Interval, IntervalStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId {
    pub tenant: String,
    pub table: String,
}

impl TableId {
    pub fn new(tenant: &str, table: &str) -> Self {
        Self { tenant: tenant.to_string(), table: table.to_string() }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    pub tenant: String,
    pub table: String,
    pub interval: String,
    pub interval_start: String,
    pub shard_num: usize,
}

impl ShardId {
    pub fn new(tenant: &str, table: &str, interval: &str, interval_start: &str, shard_num: usize) -> Self {
        Self {
            tenant: tenant.to_string(),
            table: table.to_string(),
            interval: interval.to_string(),
            interval_start: interval_start.to_string(),
            shard_num,
        }
    }

    pub fn for_timestamp(tenant: &str, table: &str, interval: Interval, timestamp: DateTime<Utc>, shard_num: usize) -> Self {
        Self::new(tenant, table, interval.interval_name(), &interval.start(timestamp), shard_num)
    }

    pub fn table_id(&self) -> TableId {
        TableId::new(&self.tenant, &self.table)
    }

    /// Relative location of the shard below the store root.
    pub fn path(&self) -> String {
        format!("{}/{}/{}/{}/{}", self.tenant, self.table, self.interval, self.interval_start, self.shard_num)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
