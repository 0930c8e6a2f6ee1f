// src/engine/batch.rs
//
// Batch processing: one operation list applied to many independent icons.
//
// Each worker owns exactly one icon at a time (apply_ops works on a copy), so
// the per-icon single-writer model holds under parallelism.
//
// A single global pool is reused across batches; it is created lazily on first
// use and later configuration changes have no effect.

use crate::engine::icon::Icon;
use crate::engine::pipeline::apply_ops;
use crate::error::{IconError, Result};
use crate::ops::Operation;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::OnceLock;

/// Maximum accepted `concurrency` for `process_batch_with_concurrency`.
pub const MAX_CONCURRENCY: usize = 1024;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// The shared pool, or `None` if it could not be built (callers then fall
/// back to rayon's default pool).
fn global_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let threads = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_THREADS)
                .max(MIN_THREADS);
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .ok()
        })
        .as_ref()
}

fn run_on(pool: Option<&ThreadPool>, icons: &[Icon], ops: &[Operation]) -> Vec<Result<Icon>> {
    let work = || -> Vec<Result<Icon>> { icons.par_iter().map(|icon| apply_ops(icon, ops)).collect() };
    match pool {
        Some(pool) => pool.install(work),
        None => work(),
    }
}

/// Apply `ops` to every icon in parallel. Results keep the input order; one
/// failing icon does not affect the others.
pub fn process_batch(icons: &[Icon], ops: &[Operation]) -> Vec<Result<Icon>> {
    run_on(global_pool(), icons, ops)
}

/// Like `process_batch`, with an explicit worker count (0 = shared pool).
pub fn process_batch_with_concurrency(
    icons: &[Icon],
    ops: &[Operation],
    concurrency: usize,
) -> Result<Vec<Result<Icon>>> {
    if concurrency > MAX_CONCURRENCY {
        return Err(IconError::invalid_argument(
            "concurrency",
            concurrency.to_string(),
            format!("must be 0 or 1-{MAX_CONCURRENCY}"),
        ));
    }
    if concurrency == 0 {
        return Ok(process_batch(icons, ops));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .build()
        .map_err(|e| {
            IconError::invalid_argument(
                "concurrency",
                concurrency.to_string(),
                format!("failed to build thread pool: {e}"),
            )
        })?;
    Ok(run_on(Some(&pool), icons, ops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mask::MaskType;
    use crate::engine::raster::PixelType;

    fn icons() -> Vec<Icon> {
        (1..=6)
            .map(|n| Icon::new(n, n + 1, PixelType::Rgb24, MaskType::And).unwrap())
            .collect()
    }

    #[test]
    fn test_batch_keeps_order_and_isolation() {
        let inputs = icons();
        let results = process_batch(&inputs, &[Operation::Rotate { degrees: 90.0 }]);
        assert_eq!(results.len(), inputs.len());
        for (input, result) in inputs.iter().zip(&results) {
            let out = result.as_ref().unwrap();
            assert_eq!(out.dimensions(), (input.height(), input.width()));
        }
        assert_eq!(inputs[0].dimensions(), (1, 2));
    }

    #[test]
    fn test_batch_failures_are_per_icon() {
        let inputs = icons();
        let results = process_batch(
            &inputs,
            &[Operation::Extract { x: 0, y: 0, width: 0, height: 1 }],
        );
        assert!(results.iter().all(|r| r.is_err()));
    }

    #[test]
    fn test_explicit_concurrency() {
        let inputs = icons();
        let results = process_batch_with_concurrency(
            &inputs,
            &[Operation::Stretch { width: 4, height: 4 }],
            2,
        )
        .unwrap();
        assert!(results.iter().all(|r| r.as_ref().map(|i| i.dimensions()) == Ok((4, 4))));

        let err = process_batch_with_concurrency(&inputs, &[], MAX_CONCURRENCY + 1).unwrap_err();
        assert!(matches!(err, IconError::InvalidArgument { .. }));
    }
}
