use crate::schema::{ColumnId, DataType};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    pub fn data_type(&self) -> DataType {
        match self {
            EntityId::Int(_) => DataType::Long,
            EntityId::Str(_) => DataType::String,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            EntityId::Int(i) => i.to_le_bytes().to_vec(),
            EntityId::Str(s) => s.as_bytes().to_vec(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Int(i) => Value::Long(*i),
            EntityId::Str(s) => Value::String(s.clone()),
        }
    }
}

impl From<i64> for EntityId {
    fn from(v: i64) -> Self { EntityId::Int(v) }
}

impl From<i32> for EntityId {
    fn from(v: i32) -> Self { EntityId::Int(v as i64) }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self { EntityId::Str(v.to_string()) }
}

impl From<String> for EntityId {
    fn from(v: String) -> Self { EntityId::Str(v) }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{}", i),
            EntityId::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Boolean(bool),
    /// Milliseconds since the epoch.
    Datetime(i64),
}

impl Value {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(DataType::Integer),
            Value::Long(_) => Some(DataType::Long),
            Value::Float(_) => Some(DataType::Float),
            Value::Double(_) => Some(DataType::Double),
            Value::String(_) => Some(DataType::String),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Datetime(_) => Some(DataType::Datetime),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub column_id: ColumnId,
    pub value: Value,
}

impl Column {
    pub fn new(column_id: ColumnId, value: Value) -> Self {
        Self { column_id, value }
    }

    /// Types the column after its value; nulls fall back to strings.
    pub fn of(name: &str, value: Value) -> Self {
        let data_type = value.data_type().unwrap_or(DataType::String);
        Self { column_id: ColumnId::new(name, data_type), value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub entity_id: EntityId,
    pub entity_id_column: String,
    pub version: i64,
    pub instance_id: String,
    pub columns: Vec<Column>,
}

impl Entity {
    pub fn new(entity_id_column: &str, entity_id: impl Into<EntityId>, version: i64, instance_id: &str) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_id_column: entity_id_column.to_string(),
            version,
            instance_id: instance_id.to_string(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: &str, value: Value) -> Self {
        self.columns.push(Column::of(name, value));
        self
    }

    pub fn entity_column_id(&self) -> ColumnId {
        ColumnId::new(self.entity_id_column.clone(), self.entity_id.data_type())
    }

    /// Flattens into one request per column so shard writers work column by column.
    pub fn into_write_requests(self) -> Vec<WriteRequest> {
        let Entity { entity_id, version, instance_id, columns, .. } = self;
        columns
            .into_iter()
            .map(|column| WriteRequest { entity_id: entity_id.clone(), version, instance_id: instance_id.clone(), column })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub entity_id: EntityId,
    pub version: i64,
    pub instance_id: String,
    pub column: Column,
}

/// Where an entity's value lives inside a committed column's value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub offset: u64,
    pub length: u32,
    pub version: i64,
    pub instance_id: String,
}
