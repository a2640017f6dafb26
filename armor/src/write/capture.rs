use crate::entity::{Entity, EntityId};
use crate::shard::ShardId;

/// An operation about to be applied to a shard.
#[derive(Debug, Clone, Copy)]
pub enum CapturedWrite<'a> {
    Entities(&'a [Entity]),
    Delete { entity_id: &'a EntityId, version: i64, instance_id: &'a str },
}

/// Observes writes and deletes before they reach a shard writer. Implementations must not
/// influence the outcome of the operation they observe.
pub trait WriteCapture: Send + Sync {
    /// `source` is the name of the writer issuing the operation.
    fn should_capture(&self, shard_id: &ShardId, source: &str) -> bool;

    fn capture(&self, transaction: &str, shard_id: &ShardId, write: CapturedWrite<'_>);
}
