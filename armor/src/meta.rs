use crate::schema::{ColumnId, DataType};
use crate::shard::ShardId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub column_name: String,
    pub data_type: DataType,
    pub num_entities: usize,
    pub num_rows: usize,
    /// Superseded or deleted value slots still occupying the value store.
    pub fragmented_rows: usize,
    pub value_bytes: u64,
    pub compactions: u64,
    pub max_version: Option<i64>,
    pub last_updated: DateTime<Utc>,
}

impl ColumnMetadata {
    pub fn column_id(&self) -> ColumnId {
        ColumnId::new(self.column_name.clone(), self.data_type)
    }

    pub fn fragmentation_pct(&self) -> u32 {
        if self.num_rows == 0 { 0 } else { (self.fragmented_rows * 100 / self.num_rows) as u32 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardMetadata {
    pub shard_id: ShardId,
    pub version: String,
    pub transaction: String,
    pub committed_at: DateTime<Utc>,
    pub column_metadata: Vec<ColumnMetadata>,
}

impl ShardMetadata {
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.column_metadata.iter().find(|c| c.column_name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub entity_column_id: String,
    pub entity_column_id_type: char,
    pub shard_metadata: Vec<ShardMetadata>,
}

impl TableMetadata {
    pub fn new(entity_column: &ColumnId) -> Self {
        Self { entity_column_id: entity_column.name.clone(), entity_column_id_type: entity_column.data_type.code(), shard_metadata: Vec::new() }
    }

    /// `None` when the persisted type code is unknown.
    pub fn entity_column(&self) -> Option<ColumnId> {
        DataType::from_code(self.entity_column_id_type).map(|dt| ColumnId::new(self.entity_column_id.clone(), dt))
    }
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use super::*;

    #[test]
    fn table_metadata_keeps_entity_column_through_json() {
        let mut meta = TableMetadata::new(&ColumnId::new("assetId", DataType::String));
        meta.shard_metadata.push(ShardMetadata {
            shard_id: ShardId::new("org1", "t1", "single", "1970-01-01T00:00:00Z", 0),
            version: "v1".into(),
            transaction: "tx".into(),
            committed_at: Utc::now(),
            column_metadata: vec![],
        });
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"entity_column_id_type\":\"S\""));
        let back: TableMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.entity_column().unwrap().full_name(), "assetId_S");
    }

    #[test]
    fn fragmentation_is_a_share_of_rows() {
        let meta = ColumnMetadata {
            column_name: "c".into(),
            data_type: DataType::Integer,
            num_entities: 3,
            num_rows: 4,
            fragmented_rows: 1,
            value_bytes: 10,
            compactions: 0,
            max_version: Some(2),
            last_updated: Utc::now(),
        };
        assert_eq!(meta.fragmentation_pct(), 25);
        assert_eq!(meta.column_id().full_name(), "c_I");
    }
}
