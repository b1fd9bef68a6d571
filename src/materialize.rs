//! Index-set to object array materialization.

use rayon::prelude::*;

/// Materializes `row_indices` (ascending) into `T` via `materialize_fn`,
/// with a single exact-capacity allocation. Below `parallel_threshold`
/// indices, fills sequentially; above it, partitions into
/// `parallel_chunk_span`-sized runs and fills them in parallel while
/// preserving ascending-row-index ordering in the output.
pub fn materialize_all<T, F>(
    row_indices: &[usize],
    materialize_fn: F,
    parallel_threshold: usize,
    parallel_chunk_span: usize,
) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let mut out = Vec::with_capacity(row_indices.len());

    if row_indices.len() < parallel_threshold {
        out.extend(row_indices.iter().map(|&row| materialize_fn(row)));
        return out;
    }

    let chunk_span = parallel_chunk_span.max(1);
    let chunks: Vec<Vec<T>> = row_indices
        .par_chunks(chunk_span)
        .map(|chunk| chunk.iter().map(|&row| materialize_fn(row)).collect())
        .collect();

    for mut chunk in chunks {
        out.append(&mut chunk);
    }
    out
}

/// Zero-allocation alternative: returns the row-index list itself, for
/// callers that will read Arrow columns directly rather than materialize
/// owned records.
pub fn row_indices_only(row_indices: Vec<usize>) -> Vec<usize> {
    row_indices
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sequential_path_preserves_order() {
        let indices: Vec<usize> = (0..100).collect();
        let out = materialize_all(&indices, |i| i * 2, 10_000, 4_096);
        assert_eq!(out, indices.iter().map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn parallel_path_preserves_order() {
        let indices: Vec<usize> = (0..50_000).collect();
        let out = materialize_all(&indices, |i| i, 10_000, 4_096);
        assert_eq!(out, indices);
    }

    #[test]
    fn exact_capacity_no_resize_needed() {
        let indices: Vec<usize> = (0..37).collect();
        let out = materialize_all(&indices, |i| i, 10_000, 4_096);
        assert_eq!(out.len(), 37);
        assert_eq!(out.capacity(), 37);
    }
}
