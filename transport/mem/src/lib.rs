#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # note-rpc-mem
//!
//! An in-process transport for `note-rpc`. A connection is a pair of
//! endpoints; every call stream is a pair of bounded frame queues, so the
//! transport window applies real backpressure just like a flow-controlled
//! network stream. This is the transport the test suites drive; a socket
//! transport would implement the same engine traits.

#[macro_use]
extern crate captains_log;

mod client;
pub use client::MemConnector;
mod conn;
pub use conn::{MemCall, MemFrameRx, MemFrameTx};
mod server;
pub use server::MemAcceptor;

use crossfire::*;

/// Create a connected connector/acceptor pair.
///
/// `window` bounds the frames in flight per call direction before
/// `send_frame` suspends.
pub fn pair(window: usize) -> (MemConnector, MemAcceptor) {
    let (accept_tx, accept_rx) = mpsc::unbounded_async::<MemCall>();
    (MemConnector::new(accept_tx, window), MemAcceptor::new(accept_rx))
}
