pub mod armor_writer;
pub mod capture;
pub mod column_writer;
pub mod pool;
pub mod shard_writer;
pub mod table_writer;
