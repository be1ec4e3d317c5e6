//! The runtime model defines the interface to adapt various async runtimes.
//!
//! The adapter is provided as a sub-crate:
//!
//! - `note-rpc-tokio`
//!
//! The engine only needs timers and detached spawning; everything
//! fd-shaped lives behind the transport traits instead.

use crate::io::Cancellable;
use std::future::Future;
use std::time::Duration;

/// Defines the interface we use from the async runtime
pub trait AsyncIO: Send + Sync + 'static {
    fn sleep(d: Duration) -> impl Future + Send;

    #[inline]
    fn timeout<F>(d: Duration, func: F) -> impl Future<Output = Result<F::Output, ()>> + Send
    where
        F: Future + Send,
    {
        Cancellable::new(func, Self::sleep(d))
    }

    /// Spawn a detached background coroutine with the captured runtime handle
    fn spawn_detach<F, R>(&self, f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static;
}
