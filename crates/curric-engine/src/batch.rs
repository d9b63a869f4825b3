//! Batch executor: concurrent units with isolated fault boundaries.
//!
//! Each unit runs on its own tokio task. A panic inside a unit is caught at
//! its `JoinHandle` and converted into `Internal("<op>Panicked")` for that unit
//! only. Two aggregation policies are offered:
//!
//! - [`fail_fast`]: return the first error as soon as it arrives; units still
//!   running are left to finish on their own
//! - [`partial_success`]: wait for every unit and return each outcome

use std::future::Future;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error};

use curric_core::{Error, Result};

fn panic_error(op: &str, e: JoinError) -> Error {
    error!(
        subsystem = "batch",
        op,
        error = %e,
        panicked = e.is_panic(),
        "Batch unit aborted"
    );
    Error::internal(format!("{}Panicked", op))
}

/// Run one unit on its own task, converting a panic into an error.
pub async fn isolated<T, F>(op: &'static str, unit: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(unit).await {
        Ok(result) => result,
        Err(e) => Err(panic_error(op, e)),
    }
}

/// Run every unit concurrently and return results in input order.
///
/// The first failure (error or panic) is returned immediately.
pub async fn fail_fast<T, F>(op: &'static str, units: Vec<F>) -> Result<Vec<T>>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let start = Instant::now();
    let total = units.len();
    let handles: Vec<JoinHandle<Result<T>>> = units.into_iter().map(tokio::spawn).collect();

    let mut pending: FuturesUnordered<_> = handles
        .into_iter()
        .enumerate()
        .map(|(position, handle)| async move { (position, handle.await) })
        .collect();

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    while let Some((position, joined)) = pending.next().await {
        let value = match joined {
            Ok(result) => result?,
            Err(e) => return Err(panic_error(op, e)),
        };
        slots[position] = Some(value);
    }

    debug!(
        subsystem = "batch",
        op,
        result_count = total,
        duration_ms = start.elapsed().as_millis() as u64,
        "Fail-fast batch complete"
    );
    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| Error::internal(format!("{}Error", op))))
        .collect()
}

/// Run every unit concurrently and wait for all of them.
///
/// Outcomes come back in completion order, each paired with its key.
pub async fn partial_success<K, T, F>(op: &'static str, units: Vec<(K, F)>) -> Vec<(K, Result<T>)>
where
    K: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let start = Instant::now();
    let mut pending: FuturesUnordered<_> = units
        .into_iter()
        .map(|(key, unit)| {
            let handle = tokio::spawn(unit);
            async move { (key, handle.await) }
        })
        .collect();

    let mut outcomes = Vec::with_capacity(pending.len());
    while let Some((key, joined)) = pending.next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(panic_error(op, e)),
        };
        outcomes.push((key, result));
    }

    debug!(
        subsystem = "batch",
        op,
        result_count = outcomes.len(),
        failed = outcomes.iter().filter(|(_, r)| r.is_err()).count(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Partial-success batch complete"
    );
    outcomes
}
