use crate::entity::EntityId;
use xxhash_rust::xxh3::xxh3_64;

/// Decides which shard of a bucket owns an entity. Must be deterministic and stable for a
/// given tenant, table and shard count.
pub trait EntityRouter: Send + Sync {
    fn shard_count(&self) -> usize;
    fn shard_num(&self, tenant: &str, table: &str, entity_id: &EntityId) -> usize;
}

/// Fast, deterministic router over the entity id bytes.
#[derive(Clone, Debug)]
pub struct Xxh3Router(usize);

impl Xxh3Router {
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "shard count must be > 0");
        Self(n)
    }

    #[inline]
    pub fn partition_bytes(&self, bytes: &[u8]) -> usize {
        if self.0 == 1 { return 0; }
        (xxh3_64(bytes) % (self.0 as u64)) as usize
    }
}

impl EntityRouter for Xxh3Router {
    fn shard_count(&self) -> usize {
        self.0
    }

    #[inline]
    fn shard_num(&self, _tenant: &str, _table: &str, entity_id: &EntityId) -> usize {
        self.partition_bytes(&entity_id.to_bytes())
    }
}
