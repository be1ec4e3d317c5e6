//! Traits for the transport layer underneath the engine.
//!
//! The transport owns the connection and the multiplexing of many
//! concurrent call streams onto it; the engine consumes one bidirectional
//! frame pipe per call, with frame boundaries preserved. The in-process
//! implementation lives in `note-rpc-mem`; a socket transport would plug in
//! at the same seam.

use std::fmt;
use std::future::Future;

/// The peer's end of a call stream is gone (force-closed or dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("call stream closed")]
pub struct Closed;

/// Client-side handle of a connection, able to open call streams.
pub trait CallConnector: Send + Sync + Sized + 'static + fmt::Debug {
    type Conn: CallConn;

    /// Open a fresh bidirectional call stream on the connection.
    fn open_call(&self) -> impl Future<Output = Result<Self::Conn, Closed>> + Send;
}

/// Server-side handle of a connection, yielding peer-opened call streams.
pub trait CallAcceptor: Send + Sized + 'static + fmt::Debug {
    type Conn: CallConn;

    /// Wait for the peer to open a call stream.
    /// Err(Closed) when the connection itself is gone.
    fn accept_call(&mut self) -> impl Future<Output = Result<Self::Conn, Closed>> + Send;
}

/// One bidirectional, frame-preserving call stream.
pub trait CallConn: Send + 'static {
    type Tx: FrameTx;
    type Rx: FrameRx;

    /// The engine drives the two directions from separate coroutines.
    fn split(self) -> (Self::Tx, Self::Rx);
}

pub trait FrameTx: Send + 'static {
    /// Send one frame. Suspends while the peer has unconsumed frames beyond
    /// the transport window, which is what bounds in-flight memory.
    fn send_frame(&mut self, frame: Vec<u8>) -> impl Future<Output = Result<(), Closed>> + Send;

    /// Force teardown of this direction. The peer may still drain frames
    /// already in flight, then observes Closed.
    fn close(&mut self);
}

pub trait FrameRx: Send + 'static {
    fn recv_frame(&mut self) -> impl Future<Output = Result<Vec<u8>, Closed>> + Send;
}
