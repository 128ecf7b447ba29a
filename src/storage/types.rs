// Redis value types

use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};

/// Sorted Set implementation using BTreeMap for range queries
/// and HashMap for O(1) member->score lookups
#[derive(Debug, Clone, Default)]
pub struct ZSet {
    // BTreeMap: (score, member) -> () for ordered access
    pub scores: BTreeMap<(OrderedFloat<f64>, Bytes), ()>,
    // HashMap: member -> score for quick score lookups
    pub members: HashMap<Bytes, f64>,
}

impl ZSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a member; returns true if it was new
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        let added = match self.members.get(&member) {
            Some(old_score) => {
                self.scores.remove(&(OrderedFloat(*old_score), member.clone()));
                false
            }
            None => true,
        };
        self.scores.insert((OrderedFloat(score), member.clone()), ());
        self.members.insert(member, score);
        added
    }

    pub fn remove(&mut self, member: &Bytes) -> bool {
        match self.members.remove(member) {
            Some(score) => {
                self.scores.remove(&(OrderedFloat(score), member.clone()));
                true
            }
            None => false,
        }
    }

    /// Remove and return the lowest-scored member (ties broken by member bytes)
    pub fn pop_min(&mut self) -> Option<(Bytes, f64)> {
        let ((score, member), _) = self.scores.pop_first()?;
        self.members.remove(&member);
        Some((member, score.0))
    }

    pub fn score(&self, member: &Bytes) -> Option<f64> {
        self.members.get(member).copied()
    }

    /// Members in score order
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        self.scores.keys().map(|(score, member)| (member, score.0))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum RedisValue {
    String(Bytes),
    Hash(HashMap<Bytes, Bytes>),
    ZSet(ZSet),
}

impl RedisValue {
    pub fn type_name(&self) -> &str {
        match self {
            RedisValue::String(_) => "string",
            RedisValue::Hash(_) => "hash",
            RedisValue::ZSet(_) => "zset",
        }
    }

    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            RedisValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for RedisValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RedisValue::String(a), RedisValue::String(b)) => a == b,
            (RedisValue::Hash(a), RedisValue::Hash(b)) => a == b,
            (RedisValue::ZSet(a), RedisValue::ZSet(b)) => a.members == b.members,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zset_orders_by_score_then_member() {
        let mut zset = ZSet::new();
        assert!(zset.insert(Bytes::from("b"), 1.0));
        assert!(zset.insert(Bytes::from("a"), 1.0));
        assert!(zset.insert(Bytes::from("c"), 0.5));

        assert_eq!(zset.pop_min(), Some((Bytes::from("c"), 0.5)));
        assert_eq!(zset.pop_min(), Some((Bytes::from("a"), 1.0)));
        assert_eq!(zset.pop_min(), Some((Bytes::from("b"), 1.0)));
        assert_eq!(zset.pop_min(), None);
    }

    #[test]
    fn test_zset_update_moves_member() {
        let mut zset = ZSet::new();
        zset.insert(Bytes::from("job"), 5.0);
        assert!(!zset.insert(Bytes::from("job"), 1.0));
        assert_eq!(zset.len(), 1);
        assert_eq!(zset.score(&Bytes::from("job")), Some(1.0));
        assert_eq!(zset.scores.len(), 1);
    }
}
