//! Property-based tests for the engine's core invariants: `count` agrees
//! with `materialize_all`'s length, `any` agrees with `count > 0`,
//! conjunction is commutative, and adding a predicate never increases the
//! selected count.

use std::collections::HashMap;

use arrow::array::{BooleanArray, Int64Array};
use colbatch::{
    new_collection, Column, EngineConfig, LogicalQuery, Operator, PredicateKind, QueryResult,
    Scalar, Terminal,
};
use proptest::collection::vec as pvec;
use proptest::prelude::*;

fn build_collection(
    values: Vec<i64>,
    flags: Vec<bool>,
) -> colbatch::Collection<(i64, bool)> {
    let mut map = HashMap::new();
    map.insert("Value".to_owned(), 0usize);
    map.insert("IsActive".to_owned(), 1usize);

    let value_col = Column::Int64(Int64Array::from(values.clone()));
    let flag_col = Column::Boolean(BooleanArray::from(flags.clone()));
    let columns = vec![value_col, flag_col];

    new_collection(
        columns,
        map,
        move |row: usize| (values[row], flags[row]),
        EngineConfig::default(),
    )
}

fn count_of(query: &LogicalQuery, collection: &colbatch::Collection<(i64, bool)>) -> i64 {
    match collection.query(query, None).unwrap() {
        QueryResult::Count(c) => c,
        other => panic!("expected Count, got {other:?}"),
    }
}

fn gt_predicate(threshold: i64) -> PredicateKind {
    PredicateKind::Numeric { op: Operator::GT, literal: Scalar::I64(threshold) }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `count(execute(B, P))` equals the length of
    /// `materialize_all(execute(B, P))`.
    #[test]
    fn count_matches_materialize_len(
        values in pvec(-1000i64..1000, 1..200),
        flags in pvec(any::<bool>(), 1..200),
        threshold in -1000i64..1000,
    ) {
        let n = values.len().min(flags.len());
        let values = values[..n].to_vec();
        let flags = flags[..n].to_vec();
        prop_assume!(n > 0);

        let collection = build_collection(values, flags);
        let count_query = LogicalQuery::new(Terminal::Count).with_predicate("Value", gt_predicate(threshold));
        let materialize_query = LogicalQuery::new(Terminal::MaterializeAll).with_predicate("Value", gt_predicate(threshold));

        let count = count_of(&count_query, &collection);
        let materialized = match collection.query(&materialize_query, None).unwrap() {
            QueryResult::MaterializeAll(rows) => rows,
            other => panic!("expected MaterializeAll, got {other:?}"),
        };
        prop_assert_eq!(count as usize, materialized.len());
    }

    /// `any(execute(B, P))` equals `count(execute(B, P)) > 0`.
    #[test]
    fn any_matches_count_positive(
        values in pvec(-1000i64..1000, 1..200),
        flags in pvec(any::<bool>(), 1..200),
        threshold in -1000i64..1000,
    ) {
        let n = values.len().min(flags.len());
        let values = values[..n].to_vec();
        let flags = flags[..n].to_vec();
        prop_assume!(n > 0);

        let collection = build_collection(values, flags);
        let any_query = LogicalQuery::new(Terminal::Any).with_predicate("Value", gt_predicate(threshold));
        let count_query = LogicalQuery::new(Terminal::Count).with_predicate("Value", gt_predicate(threshold));

        let any = match collection.query(&any_query, None).unwrap() {
            QueryResult::Any(b) => b,
            other => panic!("expected Any, got {other:?}"),
        };
        let count = count_of(&count_query, &collection);
        prop_assert_eq!(any, count > 0);
    }

    /// Conjunction is commutative —
    /// `count(WHERE p1 AND p2) = count(WHERE p2 AND p1)`.
    #[test]
    fn conjunction_is_commutative(
        values in pvec(-1000i64..1000, 1..200),
        flags in pvec(any::<bool>(), 1..200),
        threshold in -1000i64..1000,
    ) {
        let n = values.len().min(flags.len());
        let values = values[..n].to_vec();
        let flags = flags[..n].to_vec();
        prop_assume!(n > 0);

        let collection = build_collection(values, flags);
        let forward = LogicalQuery::new(Terminal::Count)
            .with_predicate("Value", gt_predicate(threshold))
            .with_predicate("IsActive", PredicateKind::BooleanEquals { expected: true });
        let reversed = LogicalQuery::new(Terminal::Count)
            .with_predicate("IsActive", PredicateKind::BooleanEquals { expected: true })
            .with_predicate("Value", gt_predicate(threshold));

        prop_assert_eq!(count_of(&forward, &collection), count_of(&reversed, &collection));
    }

    /// Monotonicity — adding a predicate never increases the selected
    /// count.
    #[test]
    fn additional_predicate_is_monotonically_non_increasing(
        values in pvec(-1000i64..1000, 1..200),
        flags in pvec(any::<bool>(), 1..200),
        threshold in -1000i64..1000,
    ) {
        let n = values.len().min(flags.len());
        let values = values[..n].to_vec();
        let flags = flags[..n].to_vec();
        prop_assume!(n > 0);

        let collection = build_collection(values, flags);
        let base = LogicalQuery::new(Terminal::Count).with_predicate("Value", gt_predicate(threshold));
        let narrowed = LogicalQuery::new(Terminal::Count)
            .with_predicate("Value", gt_predicate(threshold))
            .with_predicate("IsActive", PredicateKind::BooleanEquals { expected: true });

        prop_assert!(count_of(&base, &collection) >= count_of(&narrowed, &collection));
    }

    /// For any selection with at least one row, `min(col) <= avg(col) <=
    /// max(col)` restricted to the same selection.
    #[test]
    fn min_le_avg_le_max(
        values in pvec(-1000i64..1000, 1..200),
        flags in pvec(any::<bool>(), 1..200),
    ) {
        let n = values.len().min(flags.len());
        let values = values[..n].to_vec();
        let flags = flags[..n].to_vec();
        prop_assume!(n > 0);
        prop_assume!(flags.iter().any(|&f| f));

        let collection = build_collection(values, flags);
        let active = PredicateKind::BooleanEquals { expected: true };

        let min = match collection
            .query(&LogicalQuery::new(Terminal::SimpleAggregate {
                op: colbatch::AggregateOp::Min,
                field_name: "Value".to_owned(),
            }).with_predicate("IsActive", active.clone()), None)
            .unwrap()
        {
            QueryResult::SimpleAggregate(Scalar::I64(v)) => v as f64,
            other => panic!("expected SimpleAggregate(I64), got {other:?}"),
        };
        let max = match collection
            .query(&LogicalQuery::new(Terminal::SimpleAggregate {
                op: colbatch::AggregateOp::Max,
                field_name: "Value".to_owned(),
            }).with_predicate("IsActive", active.clone()), None)
            .unwrap()
        {
            QueryResult::SimpleAggregate(Scalar::I64(v)) => v as f64,
            other => panic!("expected SimpleAggregate(I64), got {other:?}"),
        };
        let avg = match collection
            .query(&LogicalQuery::new(Terminal::SimpleAggregate {
                op: colbatch::AggregateOp::Avg,
                field_name: "Value".to_owned(),
            }).with_predicate("IsActive", active), None)
            .unwrap()
        {
            QueryResult::SimpleAggregate(Scalar::F64(v)) => v,
            other => panic!("expected SimpleAggregate(F64), got {other:?}"),
        };

        prop_assert!(min <= avg + 1e-9);
        prop_assert!(avg <= max + 1e-9);
    }
}
