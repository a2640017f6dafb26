pub mod reader;
pub mod shard_column;
