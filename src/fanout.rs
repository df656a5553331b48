//! Join-barrier semantics for concurrent fan-out.
//!
//! Region and module fan-outs share one contract: every dispatched sibling
//! runs to completion, then the first recorded failure propagates. A
//! failing sibling never cancels the others.

use tokio::task::JoinSet;

use crate::error::{Result, RunwayError};

/// Waits for every task in the set, then surfaces the first failure.
///
/// Successful outputs are returned in completion order; if any sibling
/// failed, the first captured error is raised after all siblings have
/// finished and the successful outputs are discarded.
pub(crate) async fn join_barrier<T: Send + 'static>(mut set: JoinSet<Result<T>>) -> Result<Vec<T>> {
    let mut outputs = Vec::new();
    let mut first_error: Option<RunwayError> = None;

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(output)) => outputs.push(output),
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(RunwayError::internal(format!(
                        "worker task did not complete: {e}"
                    )));
                }
            }
        }
    }

    first_error.map_or(Ok(outputs), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_siblings_finish_before_error_is_raised() {
        let completed = Arc::new(AtomicUsize::new(0));
        let mut set: JoinSet<Result<()>> = JoinSet::new();

        for index in 0..4 {
            let completed = Arc::clone(&completed);
            set.spawn(async move {
                if index == 1 {
                    return Err(RunwayError::internal("sibling 1 failed"));
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let err = join_barrier(set).await.unwrap_err();
        assert!(err.to_string().contains("sibling 1 failed"));
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_collects_all_outputs() {
        let mut set: JoinSet<Result<usize>> = JoinSet::new();
        for index in 0..5 {
            set.spawn(async move { Ok(index) });
        }

        let mut outputs = join_barrier(set).await.unwrap();
        outputs.sort_unstable();
        assert_eq!(outputs, vec![0, 1, 2, 3, 4]);
    }
}
