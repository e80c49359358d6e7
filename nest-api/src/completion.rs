//! Completion-handler calling convention shared by every public operation.
//!
//! Each operation is written once as an `async fn` returning [`Result<T>`]; awaiting that future
//! is the deferred calling convention. The `*_with` variants hand the very same future to
//! [`dispatch`], which runs it in the background and reports its outcome to a completion handler.

use crate::error::{Error, Result};
use tokio::task::JoinHandle;

/// Boxed completion handler, for callers that need to store or pass handlers around.
pub type Completion<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Spawns `operation` on the current Tokio runtime and invokes `completion` with its outcome.
///
/// The handler is an `FnOnce` and owned by the spawned task, so it runs exactly once per call,
/// receiving either the result or the error, never both. The returned [`JoinHandle`] resolves
/// after the handler returned and can be dropped for fire-and-forget usage.
///
/// Outside of a Tokio runtime the operation is dropped without being polled, the handler is
/// invoked immediately with [`Error::Configuration`] and `None` is returned.
pub fn dispatch<T, Fut, F>(operation: Fut, completion: F) -> Option<JoinHandle<()>>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    F: FnOnce(Result<T>) + Send + 'static,
{
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!(?err, "No Tokio runtime available, cannot run operation");
            completion(Err(Error::configuration(format!(
                "Completion handlers require a Tokio runtime: {err}"
            ))));
            return None;
        }
    };

    Some(handle.spawn(async move {
        let outcome = operation.await;
        tracing::trace!(ok = outcome.is_ok(), "Invoking completion handler");
        completion(outcome);
    }))
}
