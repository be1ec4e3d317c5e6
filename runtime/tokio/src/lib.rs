#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # note-rpc-tokio
//!
//! This crate provides a runtime adapter for `note-rpc` to work with the
//! `tokio` runtime. It implements the
//! [AsyncIO](note_rpc_core::runtime::AsyncIO) trait.

use note_rpc_core::runtime::AsyncIO;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;

/// The main struct for tokio runtime IO; assign this type to the factory's
/// `IO` associated type when used.
pub struct TokioRT(Handle);

impl TokioRT {
    /// Capture a tokio runtime handle to ensure background coroutines can spawn
    #[inline]
    pub fn new(handle: Handle) -> Self {
        Self(handle)
    }

    /// Capture the handle of the runtime the caller is currently on.
    ///
    /// Panics outside a runtime context, as [Handle::current] does.
    #[inline]
    pub fn current() -> Self {
        Self(Handle::current())
    }
}

impl AsyncIO for TokioRT {
    #[inline(always)]
    fn sleep(d: Duration) -> impl Future + Send {
        tokio::time::sleep(d)
    }

    /// spawn background coroutine with the captured runtime handle
    #[inline]
    fn spawn_detach<F, R>(&self, f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        self.0.spawn(f);
    }
}
