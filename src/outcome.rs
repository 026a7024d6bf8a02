//! Two-step writes with a compensating undo.

use std::future::Future;

/// Result of a second step that may have to undo the first.
#[derive(Debug)]
pub enum Outcome<T, F, C> {
    /// Both steps succeeded.
    Committed(T),
    /// The second step failed and the first was undone.
    Compensated(F),
    /// The second step failed and so did the undo; the first step's
    /// effect is still in storage.
    NeedsReconciliation { failure: F, compensation: C },
}

/// Runs `undo` only if `result` is an error.
pub async fn compensate<T, F, C, U, Fut>(result: Result<T, F>, undo: U) -> Outcome<T, F, C>
where
    U: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), C>>,
{
    match result {
        Ok(value) => Outcome::Committed(value),
        Err(failure) => match undo().await {
            Ok(()) => Outcome::Compensated(failure),
            Err(compensation) => Outcome::NeedsReconciliation { failure, compensation },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn success_skips_undo() {
        let undone = AtomicBool::new(false);
        let outcome: Outcome<u32, &str, &str> = compensate(Ok(1), || async {
            undone.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(matches!(outcome, Outcome::Committed(1)));
        assert!(!undone.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failure_runs_undo() {
        let outcome: Outcome<u32, &str, &str> = compensate(Err("boom"), || async { Ok(()) }).await;
        assert!(matches!(outcome, Outcome::Compensated("boom")));

        let outcome: Outcome<u32, &str, &str> =
            compensate(Err("boom"), || async { Err("stuck") }).await;
        assert!(matches!(
            outcome,
            Outcome::NeedsReconciliation { failure: "boom", compensation: "stuck" }
        ));
    }
}
