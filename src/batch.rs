//! The public collection type: wraps a caller-supplied Arrow record batch,
//! a `field_name → column_index` map, a materialize callback, and the
//! engine's per-collection state (zone map, plan cache, buffer pool).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::bitmap::BufferPool;
use crate::cache::{CacheStats, PlanCache, StructuralKey};
use crate::column::Column;
use crate::config::EngineConfig;
use crate::executor::{CancellationToken, Executor, QueryResult};
use crate::error::Result;
use crate::plan::{Analyzer, LogicalQuery};
use crate::zonemap::ZoneMap;

/// An immutable, columnar in-memory collection with a pushdown query engine
/// over a single Arrow record batch.
///
/// `T` is the caller's materialized record type; `Collection` never
/// constructs one itself except through the supplied `materialize_fn` — the
/// engine itself never looks up fields by name at query time.
pub struct Collection<T> {
    columns: Vec<Column>,
    n: usize,
    field_index_map: HashMap<String, usize>,
    materialize_fn: Box<dyn Fn(usize) -> T + Send + Sync>,
    zone_map: ZoneMap,
    plan_cache: PlanCache,
    buffer_pool: Arc<BufferPool>,
    config: EngineConfig,
}

/// Constructs a new [`Collection`] over `columns`.
/// `materialize_fn(row_index) → T` is the caller-supplied, build-time-
/// generated record constructor.
pub fn new_collection<T>(
    columns: Vec<Column>,
    field_index_map: HashMap<String, usize>,
    materialize_fn: impl Fn(usize) -> T + Send + Sync + 'static,
    config: EngineConfig,
) -> Collection<T> {
    let n = columns.first().map(Column::len).unwrap_or(0);
    let zone_map = ZoneMap::build(&columns, n, config.chunk_size);
    debug!(rows = n, columns = columns.len(), "collection constructed");
    Collection {
        columns,
        n,
        field_index_map,
        materialize_fn: Box::new(materialize_fn),
        zone_map,
        plan_cache: PlanCache::new(config.cache_capacity),
        buffer_pool: BufferPool::new(),
        config,
    }
}

impl<T> Collection<T>
where
    T: Send,
{
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Executes `query`, consulting the plan cache first and analyzing
    /// (then caching) on a miss.
    pub fn query(&self, query: &LogicalQuery, cancellation: Option<CancellationToken>) -> Result<QueryResult<T>>
    where
        T: Sync,
    {
        let cancellation = cancellation.unwrap_or_default();
        let structural_key = StructuralKey::derive(query);

        let plan = match self.plan_cache.lookup(&structural_key) {
            Some(plan) => plan,
            None => {
                let plan = Analyzer::analyze(query, &self.field_index_map, &self.columns, self.config.strict_mode)?;
                self.plan_cache.insert(structural_key, plan.clone());
                plan
            }
        };

        Executor::execute(
            &plan,
            &self.columns,
            &self.zone_map,
            self.n,
            &self.buffer_pool,
            &*self.materialize_fn,
            &self.config,
            &cancellation,
        )
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.plan_cache.stats()
    }

    pub fn clear_cache(&self) {
        self.plan_cache.clear();
    }
}
