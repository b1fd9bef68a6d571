//! The parallel chunked executor: mode selection, the per-chunk driver, and
//! result assembly.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::aggregate::{self, AggregateResult, GroupByRequest};
use crate::bitmap::{BufferPool, Initial, SelectionBitmap};
use crate::column::kernel::{self, StringOp};
use crate::column::Column;
use crate::config::EngineConfig;
use crate::error::{CancelledSnafu, Result};
use crate::materialize;
use crate::plan::{Plan, ResolvedTerminal};
use crate::predicate::{self, ColumnPredicate, PredicateKind};
use crate::value::Scalar;
use crate::zonemap::ZoneMap;

/// A cooperative cancellation flag, checked at chunk boundaries. Cloning
/// shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The outcome of a query, one variant per terminal kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<T> {
    MaterializeAll(Vec<T>),
    Count(i64),
    Any(bool),
    First(Option<T>),
    SimpleAggregate(Scalar),
    MultiAggregate(Vec<(String, Scalar)>),
    GroupBy(Vec<(Scalar, Vec<(String, Scalar)>)>),
}

fn aggregate_result_to_scalar(result: AggregateResult) -> Scalar {
    match result {
        AggregateResult::Scalar(s) => s,
        AggregateResult::Count(c) => Scalar::I64(c),
    }
}

fn chunk_bounds(chunk_index: usize, chunk_size: usize, n: usize) -> (usize, usize) {
    let start = chunk_index * chunk_size;
    let end = (start + chunk_size).min(n);
    (start, end)
}

fn num_chunks(n: usize, chunk_size: usize) -> usize {
    if n == 0 {
        0
    } else {
        (n + chunk_size - 1) / chunk_size
    }
}

/// Applies one predicate's kernel to `selection` over `[start_row, end_row)`.
fn apply_predicate_kernel(
    column: &Column,
    predicate: &ColumnPredicate,
    selection: &mut SelectionBitmap,
    start_row: usize,
    end_row: usize,
) {
    match &predicate.kind {
        PredicateKind::Numeric { op, literal } => {
            kernel::numeric_compare(column, *op, literal, selection, start_row, end_row)
        }
        PredicateKind::StringEquality { literal, negate, case_insensitive } => {
            kernel::string_equals(
                column,
                literal,
                *negate,
                *case_insensitive,
                selection,
                start_row,
                end_row,
            )
        }
        PredicateKind::StringOp { op, literal } => {
            let op = match op {
                StringOp::Contains => StringOp::Contains,
                StringOp::StartsWith => StringOp::StartsWith,
                StringOp::EndsWith => StringOp::EndsWith,
            };
            kernel::string_op(column, op, literal, selection, start_row, end_row)
        }
        PredicateKind::BooleanEquals { expected } => {
            kernel::boolean_equals(column, *expected, selection, start_row, end_row)
        }
        PredicateKind::IsNull => kernel::null_check(column, true, selection, start_row, end_row),
        PredicateKind::IsNotNull => {
            kernel::null_check(column, false, selection, start_row, end_row)
        }
    }
}

/// The numeric `(column_index, operator, literal)` view of a predicate list,
/// for zone-map skip checks.
fn numeric_predicate_refs(predicates: &[ColumnPredicate]) -> Vec<(usize, crate::column::cmp::Operator, &Scalar)> {
    predicates
        .iter()
        .filter_map(|p| p.as_numeric().map(|(op, literal)| (p.column_index, op, literal)))
        .collect()
}

fn chunk_may_skip(
    zone_map: &ZoneMap,
    chunk_index: usize,
    numeric_predicates: &[(usize, crate::column::cmp::Operator, &Scalar)],
) -> bool {
    zone_map.may_skip_chunk_for_any(chunk_index, numeric_predicates)
}

/// Evaluates reordered `predicates` over one chunk, AND-updating `selection`
/// in place, stopping early if the chunk's selection becomes entirely
/// clear between predicates.
fn evaluate_chunk(
    columns: &[Column],
    predicates: &[ColumnPredicate],
    selection: &mut SelectionBitmap,
    start_row: usize,
    end_row: usize,
) {
    for predicate in predicates {
        if selection.is_range_all_clear(start_row, end_row) {
            break;
        }
        apply_predicate_kernel(&columns[predicate.column_index], predicate, selection, start_row, end_row);
    }
}

/// Executes `plan` against `columns`/`zone_map`, producing a [`QueryResult`].
pub struct Executor;

impl Executor {
    pub fn execute<T, F>(
        plan: &Plan,
        columns: &[Column],
        zone_map: &ZoneMap,
        n: usize,
        pool: &Arc<BufferPool>,
        materialize_fn: &F,
        config: &EngineConfig,
        cancellation: &CancellationToken,
    ) -> Result<QueryResult<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let mut predicates = plan.predicates.clone();
        predicate::reorder_for_conjunction(&mut predicates, zone_map, n);

        match plan.resolved_terminal {
            ResolvedTerminal::Any | ResolvedTerminal::First => {
                Self::execute_streaming(plan, columns, zone_map, n, &predicates, materialize_fn, config, cancellation)
            }
            ResolvedTerminal::TakeN => Self::execute_sparse_index(
                plan,
                columns,
                zone_map,
                n,
                &predicates,
                materialize_fn,
                config,
                cancellation,
            ),
            _ => Self::execute_bitmap(
                plan, columns, zone_map, n, pool, &predicates, materialize_fn, config, cancellation,
            ),
        }
    }

    fn execute_bitmap<T, F>(
        plan: &Plan,
        columns: &[Column],
        zone_map: &ZoneMap,
        n: usize,
        pool: &Arc<BufferPool>,
        predicates: &[ColumnPredicate],
        materialize_fn: &F,
        config: &EngineConfig,
        cancellation: &CancellationToken,
    ) -> Result<QueryResult<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let mut selection = SelectionBitmap::create(pool, n as i64, Initial::AllSet)?;
        let chunk_size = config.chunk_size;

        if cancellation.is_cancelled() {
            return CancelledSnafu.fail();
        }

        // Each chunk's predicate evaluation only ever reads/writes its own
        // row range, so chunk tasks fan out over rayon's work-stealing pool
        // and are folded back into the single owned bitmap on the calling
        // thread afterward — `selection` never has two writers on the same
        // block at once.
        evaluate_bitmap_mode_parallel(
            columns,
            predicates,
            zone_map,
            &mut selection,
            n,
            chunk_size,
            pool,
        );

        if cancellation.is_cancelled() {
            return CancelledSnafu.fail();
        }

        trace!(selected = selection.count_set(), "bitmap mode evaluation complete");
        Self::finish_bitmap_mode(plan, columns, selection, materialize_fn, config)
    }

    fn finish_bitmap_mode<T, F>(
        plan: &Plan,
        columns: &[Column],
        selection: SelectionBitmap,
        materialize_fn: &F,
        config: &EngineConfig,
    ) -> Result<QueryResult<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        match plan.resolved_terminal {
            ResolvedTerminal::Count => Ok(QueryResult::Count(selection.count_set() as i64)),
            ResolvedTerminal::Any => Ok(QueryResult::Any(selection.count_set() > 0)),
            ResolvedTerminal::MaterializeAll => {
                let indices: Vec<usize> = selection.iter_set_indices().collect();
                let rows = materialize::materialize_all(
                    &indices,
                    materialize_fn,
                    config.parallel_threshold,
                    config.parallel_chunk_span,
                );
                Ok(QueryResult::MaterializeAll(rows))
            }
            ResolvedTerminal::SimpleAggregate => {
                let (op, column_index) =
                    plan.simple_aggregate.expect("plan validated by analyzer");
                let result = aggregate::aggregate(op, &columns[column_index], &selection)?;
                Ok(QueryResult::SimpleAggregate(aggregate_result_to_scalar(result)))
            }
            ResolvedTerminal::MultiAggregate => {
                let mut out = Vec::with_capacity(plan.multi_aggregate.len());
                for (op, column_index, name) in &plan.multi_aggregate {
                    let result = aggregate::aggregate(*op, &columns[*column_index], &selection)?;
                    out.push((name.clone(), aggregate_result_to_scalar(result)));
                }
                Ok(QueryResult::MultiAggregate(out))
            }
            ResolvedTerminal::GroupBy => {
                let group_by = plan.group_by.as_ref().expect("plan validated by analyzer");
                let requests: Vec<GroupByRequest<'_>> = group_by
                    .aggregates
                    .iter()
                    .map(|(op, column_index, name)| GroupByRequest {
                        op: *op,
                        column: &columns[*column_index],
                        result_name: name,
                    })
                    .collect();
                let result = aggregate::group_by(
                    &columns[group_by.key_column],
                    &requests,
                    &selection,
                    config.small_cardinality_threshold,
                )?;
                let groups = result
                    .groups
                    .into_iter()
                    .map(|(key, values)| {
                        let values = values
                            .into_iter()
                            .map(|(name, result)| (name, aggregate_result_to_scalar(result)))
                            .collect();
                        (key, values)
                    })
                    .collect();
                Ok(QueryResult::GroupBy(groups))
            }
            ResolvedTerminal::First | ResolvedTerminal::TakeN => {
                unreachable!("First/TakeN never reach bitmap-mode finish")
            }
        }
    }

    fn execute_streaming<T, F>(
        plan: &Plan,
        columns: &[Column],
        zone_map: &ZoneMap,
        n: usize,
        predicates: &[ColumnPredicate],
        materialize_fn: &F,
        config: &EngineConfig,
        cancellation: &CancellationToken,
    ) -> Result<QueryResult<T>>
    where
        F: Fn(usize) -> T,
    {
        let chunk_size = config.chunk_size;
        let total_chunks = num_chunks(n, chunk_size);
        let numeric_predicates = numeric_predicate_refs(predicates);

        for chunk_index in 0..total_chunks {
            if cancellation.is_cancelled() {
                return CancelledSnafu.fail();
            }
            let (start_row, end_row) = chunk_bounds(chunk_index, chunk_size, n);
            if chunk_may_skip(zone_map, chunk_index, &numeric_predicates) {
                continue;
            }
            for row in start_row..end_row {
                let matches = predicates
                    .iter()
                    .all(|p| predicate::row_matches(&columns[p.column_index], &p.kind, row));
                if matches {
                    debug!(row, "streaming mode short-circuited on first match");
                    return Ok(match plan.resolved_terminal {
                        ResolvedTerminal::Any => QueryResult::Any(true),
                        ResolvedTerminal::First => QueryResult::First(Some(materialize_fn(row))),
                        _ => unreachable!("streaming mode only serves any/first"),
                    });
                }
            }
        }

        Ok(match plan.resolved_terminal {
            ResolvedTerminal::Any => QueryResult::Any(false),
            ResolvedTerminal::First => QueryResult::First(None),
            _ => unreachable!("streaming mode only serves any/first"),
        })
    }

    fn execute_sparse_index<T, F>(
        plan: &Plan,
        columns: &[Column],
        zone_map: &ZoneMap,
        n: usize,
        predicates: &[ColumnPredicate],
        materialize_fn: &F,
        config: &EngineConfig,
        cancellation: &CancellationToken,
    ) -> Result<QueryResult<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let skip = plan.skip.unwrap_or(0);
        let take = plan.take.unwrap_or(0);
        let limit = skip + take;

        let chunk_size = config.chunk_size;
        let total_chunks = num_chunks(n, chunk_size);
        let numeric_predicates = numeric_predicate_refs(predicates);
        let reached = AtomicUsize::new(0);

        let mut per_chunk_matches: Vec<Vec<usize>> = Vec::with_capacity(total_chunks);
        for chunk_index in 0..total_chunks {
            if cancellation.is_cancelled() {
                return CancelledSnafu.fail();
            }
            if limit > 0 && reached.load(Ordering::Relaxed) >= limit {
                per_chunk_matches.push(Vec::new());
                continue;
            }
            let (start_row, end_row) = chunk_bounds(chunk_index, chunk_size, n);
            let mut local = Vec::new();
            if !chunk_may_skip(zone_map, chunk_index, &numeric_predicates) {
                for row in start_row..end_row {
                    let matches = predicates
                        .iter()
                        .all(|p| predicate::row_matches(&columns[p.column_index], &p.kind, row));
                    if matches {
                        local.push(row);
                    }
                }
            }
            reached.fetch_add(local.len(), Ordering::Relaxed);
            per_chunk_matches.push(local);
        }

        let mut all_matches: Vec<usize> = per_chunk_matches.into_iter().flatten().collect();
        if limit > 0 {
            all_matches.truncate(limit);
        }
        let selected: Vec<usize> = all_matches.into_iter().skip(skip).collect();

        let rows = materialize::materialize_all(
            &selected,
            materialize_fn,
            config.parallel_threshold,
            config.parallel_chunk_span,
        );
        Ok(QueryResult::MaterializeAll(rows))
    }
}

/// Drives the bitmap-mode chunk loop over a rayon fork-join pool. The
/// zone-map skip decision for every chunk is cheap and read-only, so it is
/// computed across the pool first; each chunk's predicate AND-chain (the
/// expensive part) also runs independently per chunk since chunks own
/// disjoint row ranges, then results are folded into the single owned
/// `selection` sequentially to keep it single-writer.
fn evaluate_bitmap_mode_parallel(
    columns: &[Column],
    predicates: &[ColumnPredicate],
    zone_map: &ZoneMap,
    selection: &mut SelectionBitmap,
    n: usize,
    chunk_size: usize,
    pool: &Arc<BufferPool>,
) {
    let total_chunks = num_chunks(n, chunk_size);
    let numeric_predicates = numeric_predicate_refs(predicates);

    let skip_decisions: Vec<bool> = (0..total_chunks)
        .into_par_iter()
        .map(|chunk_index| chunk_may_skip(zone_map, chunk_index, &numeric_predicates))
        .collect();

    // Chunks needing evaluation are independent of each other, so evaluate
    // each into its own pooled bitmap slice in parallel, then apply every
    // chunk's outcome to the shared selection on this thread.
    let evaluated: Vec<Option<SelectionBitmap>> = (0..total_chunks)
        .into_par_iter()
        .map(|chunk_index| {
            if skip_decisions[chunk_index] {
                return None;
            }
            let (start_row, end_row) = chunk_bounds(chunk_index, chunk_size, n);
            let mut local = SelectionBitmap::create(pool, n as i64, Initial::AllSet)
                .expect("chunk-local bitmap allocation");
            evaluate_chunk(columns, predicates, &mut local, start_row, end_row);
            Some(local)
        })
        .collect();

    for (chunk_index, outcome) in evaluated.into_iter().enumerate() {
        let (start_row, end_row) = chunk_bounds(chunk_index, chunk_size, n);
        match outcome {
            None => selection.clear_range(start_row, end_row),
            Some(local) => {
                for row in start_row..end_row {
                    if !local.get(row) {
                        selection.clear(row);
                    }
                }
            }
        }
    }
}
