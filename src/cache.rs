//! The plan cache: a structural-key → [`Plan`] map, bounded with LRU-style
//! eviction, backed by concurrency primitives matching the rest of the
//! engine (parking_lot + atomics, no locks on the hot read path).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::column::cmp::Operator;
use crate::column::kernel::StringOp;
use crate::plan::{AggregateOp, LogicalQuery, Plan, ResolvedTerminal, Terminal};
use crate::predicate::PredicateKind;
use crate::value::LogicalType;

/// A structural key represents the plan *shape*, independent of leaf
/// constants: method sequence, operator kinds, and constant *types* (not
/// values). Two queries differing only in a literal are distinct keys —
/// parameterized cache sharing is an explicit non-goal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralKey(u64);

fn predicate_shape(kind: &PredicateKind) -> (u8, Option<Operator>, Option<LogicalType>) {
    match kind {
        PredicateKind::Numeric { op, literal } => (0, Some(*op), Some(literal.logical_type())),
        PredicateKind::StringEquality { negate, case_insensitive, .. } => {
            (1 + (*negate as u8) + (*case_insensitive as u8) * 2, None, Some(LogicalType::Utf8))
        }
        PredicateKind::StringOp { op, .. } => {
            let tag = match op {
                StringOp::Contains => 10,
                StringOp::StartsWith => 11,
                StringOp::EndsWith => 12,
            };
            (tag, None, Some(LogicalType::Utf8))
        }
        PredicateKind::BooleanEquals { expected } => (20 + *expected as u8, None, Some(LogicalType::Boolean)),
        PredicateKind::IsNull => (30, None, None),
        PredicateKind::IsNotNull => (31, None, None),
    }
}

fn terminal_shape(terminal: &Terminal) -> Vec<u8> {
    match terminal {
        Terminal::MaterializeAll => vec![0],
        Terminal::Count => vec![1],
        Terminal::Any => vec![2],
        Terminal::First => vec![3],
        Terminal::TakeN => vec![4],
        Terminal::SimpleAggregate { op, .. } => vec![5, aggregate_op_tag(*op)],
        Terminal::MultiAggregate(requests) => {
            let mut shape = vec![6];
            shape.extend(requests.iter().map(|r| aggregate_op_tag(r.op)));
            shape
        }
        Terminal::GroupBy(spec) => {
            let mut shape = vec![7];
            shape.extend(spec.aggregates.iter().map(|r| aggregate_op_tag(r.op)));
            shape
        }
    }
}

fn aggregate_op_tag(op: AggregateOp) -> u8 {
    match op {
        AggregateOp::Sum => 0,
        AggregateOp::Avg => 1,
        AggregateOp::Min => 2,
        AggregateOp::Max => 3,
        AggregateOp::Count => 4,
    }
}

impl StructuralKey {
    /// Derives a structural key from a not-yet-analyzed [`LogicalQuery`],
    /// hashing method/operator/type shape only — never literal values, and
    /// never resolved column indices (two front-end queries over the same
    /// shape but different field names still collide, matching the
    /// "method sequence... constant types, not values" definition).
    pub fn derive(query: &LogicalQuery) -> Self {
        let mut hasher = DefaultHasher::new();
        query.has_disjunction.hash(&mut hasher);
        query.skip.is_some().hash(&mut hasher);
        query.take.is_some().hash(&mut hasher);
        query.order_by.is_some().hash(&mut hasher);

        for predicate in &query.predicates {
            let (tag, op, logical_type) = predicate_shape(&predicate.kind);
            tag.hash(&mut hasher);
            op.map(|o| o as u8).hash(&mut hasher);
            logical_type.map(|t| t as u8 as u16).hash(&mut hasher);
        }

        terminal_shape(&query.terminal).hash(&mut hasher);
        Self(hasher.finish())
    }
}

struct Entry {
    plan: Plan,
    insertion_ordinal: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

/// Bounded plan cache. Reads take a shared lock over a `hashbrown` map (the
/// teacher's concurrency idiom elsewhere in this crate is parking_lot +
/// atomics rather than a lock-free map crate, so lookups are cheap
/// shared-lock reads rather than truly lock-free, with all counter updates
/// via atomic fetch-add).
pub struct PlanCache {
    capacity: usize,
    entries: RwLock<HashMap<StructuralKey, Entry>>,
    next_ordinal: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
            next_ordinal: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn lookup(&self, key: &StructuralKey) -> Option<Plan> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.plan.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts `plan` under `key`, evicting the oldest ~25% of entries by
    /// insertion ordinal if this insert would push `size` past `capacity`.
    pub fn insert(&self, key: StructuralKey, plan: Plan) {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write();
        entries.insert(key, Entry { plan, insertion_ordinal: ordinal });

        if entries.len() > self.capacity {
            let evict_count = (self.capacity / 4).max(1);
            let mut ordinals: Vec<(StructuralKey, u64)> = entries
                .iter()
                .map(|(k, v)| (k.clone(), v.insertion_ordinal))
                .collect();
            ordinals.sort_by_key(|(_, ordinal)| *ordinal);
            for (key, _) in ordinals.into_iter().take(evict_count) {
                entries.remove(&key);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.read().len(),
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::plan::{Plan, ResolvedTerminal};

    fn dummy_plan() -> Plan {
        Plan {
            predicates: Vec::new(),
            skip: None,
            take: None,
            order_by_column: None,
            resolved_terminal: ResolvedTerminal::Count,
            simple_aggregate: None,
            multi_aggregate: Vec::new(),
            group_by: None,
            touched_columns: Vec::new(),
            fully_pushed: true,
        }
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let cache = PlanCache::new(256);
        let key = StructuralKey(42);
        cache.insert(key.clone(), dummy_plan());
        assert!(cache.lookup(&key).is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn lookup_miss_increments_misses() {
        let cache = PlanCache::new(256);
        assert!(cache.lookup(&StructuralKey(1)).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn eviction_keeps_size_at_or_below_capacity() {
        let cache = PlanCache::new(8);
        for i in 0..20u64 {
            cache.insert(StructuralKey(i), dummy_plan());
        }
        assert!(cache.stats().size <= 8);
    }

    #[test]
    fn clear_drops_all_entries() {
        let cache = PlanCache::new(8);
        cache.insert(StructuralKey(1), dummy_plan());
        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn derive_is_stable_for_identical_shapes() {
        use crate::plan::Terminal;
        let a = LogicalQuery::new(Terminal::Count).with_predicate(
            "Value",
            PredicateKind::Numeric {
                op: Operator::GT,
                literal: crate::value::Scalar::I64(1),
            },
        );
        let b = LogicalQuery::new(Terminal::Count).with_predicate(
            "Other",
            PredicateKind::Numeric {
                op: Operator::GT,
                literal: crate::value::Scalar::I64(999),
            },
        );
        assert_eq!(StructuralKey::derive(&a), StructuralKey::derive(&b));
    }

    #[test]
    fn derive_differs_for_different_operators() {
        use crate::plan::Terminal;
        let a = LogicalQuery::new(Terminal::Count).with_predicate(
            "Value",
            PredicateKind::Numeric {
                op: Operator::GT,
                literal: crate::value::Scalar::I64(1),
            },
        );
        let b = LogicalQuery::new(Terminal::Count).with_predicate(
            "Value",
            PredicateKind::Numeric {
                op: Operator::Equal,
                literal: crate::value::Scalar::I64(1),
            },
        );
        assert_ne!(StructuralKey::derive(&a), StructuralKey::derive(&b));
    }
}
