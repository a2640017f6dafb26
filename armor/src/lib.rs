//! armor stores entities column by column in shards partitioned by tenant, table and time interval.
//!
//! Every shard is versioned: a commit writes a new immutable version directory and only then swaps
//! the shard's `current` pointer, so readers resolving that pointer always see a complete version.
//! The same layout works on a local filesystem and on an object store.

pub mod entity;
pub mod error;
pub mod interval;
pub mod logger;
pub mod meta;
pub mod read;
pub mod schema;
pub mod settings;
pub mod shard;
pub mod storage;
pub mod write;

pub use chrono;
pub use entity::{Column, Entity, EntityId, EntityRecord, Value, WriteRequest};
pub use error::ArmorError;
pub use interval::{Interval, IntervalStrategy};
pub use meta::{ColumnMetadata, ShardMetadata, TableMetadata};
pub use read::reader::ArmorReader;
pub use read::shard_column::ShardColumn;
pub use schema::{ColumnId, DataType};
pub use settings::{ArmorConfig, Parallelism};
pub use shard::{ShardId, TableId};
pub use storage::backend::StorageBackend;
pub use storage::compression::Compression;
pub use storage::file::FileBackend;
pub use storage::memory::MemoryObjectStore;
pub use storage::partitioning::{EntityRouter, Xxh3Router};
pub use storage::predicate::{InstantPredicate, Operator};
pub use storage::read_store::ReadStore;
pub use storage::write_store::WriteStore;
pub use write::armor_writer::ArmorWriter;
pub use write::capture::{CapturedWrite, WriteCapture};
pub use write::pool::WorkerPool;
pub use write::table_writer::WriterRegistry;
