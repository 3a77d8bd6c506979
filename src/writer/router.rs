//! Routing of write requests to buckets

use crate::writer::request::WriteRequest;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a request's bucket index is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Hash of the full identity key
    HashIdentityKey,
    /// Hash of the partition-key subset; requests without one fall back to
    /// the identity key
    HashPartitionKey,
    /// Ignore keys, rotate through buckets
    RoundRobin,
}

/// Maps each request to a bucket index in `[0, bucket_count)`
#[derive(Debug)]
pub struct Router {
    mode: DispatchMode,
    bucket_count: usize,
    round_robin: AtomicUsize,
}

impl Router {
    pub fn new(mode: DispatchMode, bucket_count: usize) -> Self {
        Self {
            mode,
            bucket_count,
            round_robin: AtomicUsize::new(0),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn route(&self, request: &WriteRequest) -> usize {
        match self.mode {
            DispatchMode::HashIdentityKey => self.hash_to_bucket(&request.identity_key),
            DispatchMode::HashPartitionKey => {
                let key = request
                    .partition_key
                    .as_deref()
                    .unwrap_or(&request.identity_key);
                self.hash_to_bucket(key)
            }
            DispatchMode::RoundRobin => {
                self.round_robin.fetch_add(1, Ordering::Relaxed) % self.bucket_count
            }
        }
    }

    fn hash_to_bucket(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.bucket_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(key: &str) -> WriteRequest {
        WriteRequest::new("metrics", key, vec![])
    }

    #[test]
    fn identity_key_routing_is_stable() {
        let router = Router::new(DispatchMode::HashIdentityKey, 8);
        assert_eq!(router.bucket_count(), 8);
        let a = router.route(&req("pk-1"));
        assert_eq!(a, router.route(&req("pk-1")));
        assert!(a < 8);
    }

    #[test]
    fn partition_key_routing_groups_by_partition() {
        let router = Router::new(DispatchMode::HashPartitionKey, 8);
        let a = router.route(&req("pk-1").with_partition_key("tenant-7"));
        let b = router.route(&req("pk-2").with_partition_key("tenant-7"));
        assert_eq!(a, b);
    }

    #[test]
    fn partition_key_routing_falls_back_to_identity_key() {
        let router = Router::new(DispatchMode::HashPartitionKey, 8);
        assert_eq!(
            router.route(&req("pk-1")),
            Router::new(DispatchMode::HashIdentityKey, 8).route(&req("pk-1"))
        );
    }

    #[test]
    fn round_robin_cycles_through_all_buckets() {
        let router = Router::new(DispatchMode::RoundRobin, 3);
        let buckets: Vec<usize> = (0..6).map(|_| router.route(&req("same"))).collect();
        assert_eq!(buckets, vec![0, 1, 2, 0, 1, 2]);
    }
}
