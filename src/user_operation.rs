//! The opaque, caller-supplied operation the engine drives repeatedly.
//!
//! The engine knows nothing about what the operation does — only that it is
//! async, takes nothing, and resolves to a `bool`. A panicking operation is
//! caught at this boundary and recorded as a failure rather than taking a
//! worker down with it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::error;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

enum Callable {
    Plain(Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>),
    Cancellable(Arc<dyn Fn(watch::Receiver<bool>) -> BoxFuture<'static, bool> + Send + Sync>),
}

/// A boxed, clonable handle to the user's async operation.
///
/// Cloning is cheap (an `Arc` bump) — every worker holds its own clone.
#[derive(Clone)]
pub struct UserOperation {
    callable: Callable,
}

impl UserOperation {
    /// Wrap a plain `Fn() -> impl Future<Output = bool>` closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            callable: Callable::Plain(Arc::new(move || Box::pin(f()))),
        }
    }

    /// Wrap an operation that wants to observe the engine's cancellation
    /// signal (set when the graceful-stop budget expires) and can cut its
    /// own work short in response, rather than being abandoned outright.
    pub fn with_cancellation<F, Fut>(f: F) -> Self
    where
        F: Fn(watch::Receiver<bool>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            callable: Callable::Cancellable(Arc::new(move |rx| Box::pin(f(rx)))),
        }
    }

    /// Wrap a fallible operation: `Err` is logged at `debug!` and mapped to
    /// `false`, sparing callers used to idiomatic `Result`-returning Rust
    /// code from hand-writing the match themselves.
    pub fn from_result<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        Self::new(move || {
            let fut = f();
            async move {
                match fut.await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(error = %e, "user operation returned an error");
                        false
                    }
                }
            }
        })
    }

    /// Invoke the operation once, catching panics at this boundary and
    /// recording them as `success = false` rather than propagating.
    pub async fn call(&self, cancellation: watch::Receiver<bool>) -> bool {
        let fut = match &self.callable {
            Callable::Plain(f) => f(),
            Callable::Cancellable(f) => f(cancellation),
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(success) => success,
            Err(panic) => {
                let message = panic_message(&panic);
                error!(panic = %message, "user operation panicked; recording as failure");
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
