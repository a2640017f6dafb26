//! Key layout shared by readers and writers:
//!
//! ```text
//! <tenant>/<table>/table-metadata
//! <tenant>/<table>/<interval>/<intervalStart>/<shardNum>/current
//! <tenant>/<table>/<interval>/<intervalStart>/<shardNum>/<version>/<column>_<typeCode>
//! <tenant>/<table>/<interval>/<intervalStart>/<shardNum>/<version>/shard-metadata
//! ```

use crate::schema::ColumnId;
use crate::shard::ShardId;

pub const CURRENT: &str = "current";
pub const SHARD_METADATA: &str = "shard-metadata";
pub const TABLE_METADATA: &str = "table-metadata";

pub fn join(parts: &[&str]) -> String {
    parts.iter().filter(|p| !p.is_empty()).copied().collect::<Vec<_>>().join("/")
}

pub fn table_path(tenant: &str, table: &str) -> String {
    join(&[tenant, table])
}

pub fn table_metadata_path(tenant: &str, table: &str) -> String {
    join(&[tenant, table, TABLE_METADATA])
}

pub fn interval_path(tenant: &str, table: &str, interval: &str) -> String {
    join(&[tenant, table, interval])
}

pub fn interval_start_path(tenant: &str, table: &str, interval: &str, interval_start: &str) -> String {
    join(&[tenant, table, interval, interval_start])
}

pub fn current_path(shard_id: &ShardId) -> String {
    join(&[&shard_id.path(), CURRENT])
}

pub fn version_path(shard_id: &ShardId, version: &str) -> String {
    join(&[&shard_id.path(), version])
}

pub fn column_path(shard_id: &ShardId, version: &str, column_id: &ColumnId) -> String {
    join(&[&shard_id.path(), version, &column_id.full_name()])
}

pub fn shard_metadata_path(shard_id: &ShardId, version: &str) -> String {
    join(&[&shard_id.path(), version, SHARD_METADATA])
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use super::*;
    use crate::schema::DataType;

    #[test]
    fn paths_follow_the_hierarchy() {
        let shard = ShardId::new("org1", "t1", "weekly", "2021-01-01T00:00:00Z", 2);
        assert_eq!(table_metadata_path("org1", "t1"), "org1/t1/table-metadata");
        assert_eq!(current_path(&shard), "org1/t1/weekly/2021-01-01T00:00:00Z/2/current");
        assert_eq!(column_path(&shard, "v9", &ColumnId::new("level", DataType::Integer)), "org1/t1/weekly/2021-01-01T00:00:00Z/2/v9/level_I");
        assert_eq!(shard_metadata_path(&shard, "v9"), "org1/t1/weekly/2021-01-01T00:00:00Z/2/v9/shard-metadata");
        assert_eq!(join(&["", "a", "", "b"]), "a/b");
    }
}
