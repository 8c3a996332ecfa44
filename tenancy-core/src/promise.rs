use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Result, TenancyError};
use crate::scope::Scope;

/// Handle to a task running concurrently inside a child scope.
///
/// The task's single result is buffered until [`Promise::wait`] picks it up.
/// Dropping a promise that was never awaited cancels its scope.
#[derive(Debug)]
pub struct Promise<T> {
    scope: Scope,
    result: oneshot::Receiver<Result<T>>,
    handle: JoinHandle<()>,
}

impl<T> Promise<T>
where
    T: Send + 'static,
{
    /// Starts `task` on the runtime with a scope derived from `parent`.
    pub fn run<F, Fut>(parent: &Scope, task: F) -> Self
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let scope = parent.child();
        let (tx, result) = oneshot::channel();
        let fut = task(scope.clone());
        let handle = tokio::spawn(async move {
            let _ = tx.send(fut.await);
        });
        Self {
            scope,
            result,
            handle,
        }
    }

    /// Waits for the task's result, or for the scope to end, whichever comes
    /// first.
    pub async fn wait(mut self) -> Result<T> {
        tokio::select! {
            biased;
            out = &mut self.result => match out {
                Ok(result) => result,
                Err(_) => Err(TenancyError::Internal("promise task ended without a result".into())),
            },
            err = self.scope.done() => Err(err),
        }
    }

    pub fn cancel(&self) {
        self.scope.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_task_result() {
        let promise = Promise::run(&Scope::default(), |_scope| async { Ok(42_u32) });
        assert_eq!(promise.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn task_errors_are_propagated() {
        let promise = Promise::run(&Scope::default(), |_scope| async {
            Err::<(), _>(TenancyError::NotFound("tenant".into()))
        });
        assert!(promise.wait().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn cancel_unblocks_wait() {
        let promise = Promise::run(&Scope::default(), |scope| async move {
            scope.done().await;
            Ok(())
        });
        promise.cancel();
        let err = promise.wait().await.unwrap_err();
        assert!(err.is_scope_error());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_deadline_bounds_wait() {
        let parent = Scope::default().with_timeout(Duration::from_millis(20));
        let promise = Promise::run(&parent, |_scope| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let err = promise.wait().await.unwrap_err();
        assert!(matches!(err, TenancyError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn dropping_promise_cancels_its_scope() {
        let parent = Scope::default();
        let (seen_tx, seen_rx) = oneshot::channel();
        let promise = Promise::run(&parent, |scope| async move {
            scope.done().await;
            let _ = seen_tx.send(());
            Ok(())
        });
        drop(promise);
        seen_rx.await.unwrap();
        assert!(!parent.is_done());
    }
}
