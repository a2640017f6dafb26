use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Long,
    Float,
    Double,
    String,
    Boolean,
    Datetime,
}

impl DataType {
    pub fn code(&self) -> char {
        match self {
            DataType::Integer => 'I',
            DataType::Long => 'L',
            DataType::Float => 'F',
            DataType::Double => 'D',
            DataType::String => 'S',
            DataType::Boolean => 'B',
            DataType::Datetime => 'T',
        }
    }

    pub fn from_code(code: char) -> Option<DataType> {
        match code {
            'I' => Some(DataType::Integer),
            'L' => Some(DataType::Long),
            'F' => Some(DataType::Float),
            'D' => Some(DataType::Double),
            'S' => Some(DataType::String),
            'B' => Some(DataType::Boolean),
            'T' => Some(DataType::Datetime),
            _ => None,
        }
    }
}

/// A column is identified by its name alone; the type only drives the physical encoding
/// and is carried in the file name suffix (`level_I`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnId {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnId {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type }
    }

    pub fn full_name(&self) -> String {
        format!("{}_{}", self.name, self.data_type.code())
    }

    pub fn parse(full_name: &str) -> Option<ColumnId> {
        let (name, code) = full_name.rsplit_once('_')?;
        let mut chars = code.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !name.is_empty() => DataType::from_code(c).map(|dt| ColumnId::new(name, dt)),
            _ => None,
        }
    }
}

impl PartialEq for ColumnId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ColumnId {}

impl Hash for ColumnId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn file_names_carry_the_type_code() {
        assert_eq!(ColumnId::new("name", DataType::String).full_name(), "name_S");
        assert_eq!(ColumnId::new("first_seen", DataType::Datetime).full_name(), "first_seen_T");
        let parsed = ColumnId::parse("first_seen_T").unwrap();
        assert_eq!(parsed.name, "first_seen");
        assert_eq!(parsed.data_type, DataType::Datetime);
    }

    #[test]
    fn unknown_names_do_not_parse() {
        assert!(ColumnId::parse("shard-metadata").is_none());
        assert!(ColumnId::parse("level_X").is_none());
        assert!(ColumnId::parse("level_II").is_none());
        assert!(ColumnId::parse("_I").is_none());
    }

    #[test]
    fn equality_is_by_case_sensitive_name() {
        assert_eq!(ColumnId::new("level", DataType::Integer), ColumnId::new("level", DataType::Long));
        assert_ne!(ColumnId::new("level", DataType::Integer), ColumnId::new("Level", DataType::Integer));
        let set: HashSet<ColumnId> = [ColumnId::new("a", DataType::String), ColumnId::new("a", DataType::Integer)].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn codes_round_trip() {
        for dt in [DataType::Integer, DataType::Long, DataType::Float, DataType::Double, DataType::String, DataType::Boolean, DataType::Datetime] {
            assert_eq!(DataType::from_code(dt.code()), Some(dt));
        }
    }
}
