//! The serving side of the engine.
//!
//! [RpcServer] accepts call streams from a transport acceptor, performs the
//! header handshake, and hands each call to the user-defined dispatcher as
//! a [ServerCall]. Each call runs as its own detached coroutine, so a slow
//! handler never blocks the accept loop or its sibling calls.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossfire::*;
use note_rpc_core::io::Cancellable;
use note_rpc_core::runtime::AsyncIO;
use note_rpc_core::status::Status;
use note_rpc_core::{Codec, ServerConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::deadline::Deadline;
use crate::mux::{Inbound, Outbound};
use crate::proto::{self, CallHeader, CallShape, FrameKind};
use crate::session::{self, CallShared, CallState};
use crate::transport::{CallAcceptor, CallConn, FrameRx, FrameTx};

/// A central hub defined by the user for the serving side.
pub trait ServerFactory: Send + Sync + Sized + 'static {
    type Codec: Codec;
    type IO: AsyncIO;
    type Acceptor: CallAcceptor;

    /// Routes accepted calls to handlers; constructed once per connection.
    type Dispatch: CallDispatch<Self>;

    fn get_config(&self) -> &ServerConfig;

    /// Define how the async runtime spawns a detached coroutine
    fn spawn_detach<F, R>(&self, f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static;

    /// Called when a connection is established
    fn new_dispatcher(&self) -> Self::Dispatch;
}

/// Routes one accepted call to its handler. The dispatcher owns method
/// lookup: unknown methods and shape mismatches are finished with the
/// matching status here, not inside the engine.
pub trait CallDispatch<F: ServerFactory>: Send + Sync + Sized + 'static {
    fn dispatch(&self, call: ServerCall<F::Codec>) -> impl Future<Output = ()> + Send;
}

pub struct RpcServer<F: ServerFactory> {
    factory: Arc<F>,
}

impl<F: ServerFactory> RpcServer<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self { factory }
    }

    /// Serve one connection until it closes. Every accepted call stream is
    /// handled on its own detached coroutine.
    pub async fn serve_conn(&self, mut acceptor: F::Acceptor) {
        let dispatcher = Arc::new(self.factory.new_dispatcher());
        let mut next_id: u64 = 0;
        loop {
            match acceptor.accept_call().await {
                Err(_) => {
                    debug!("{:?} connection closed", acceptor);
                    return;
                }
                Ok(conn) => {
                    next_id += 1;
                    let id = next_id;
                    let factory = self.factory.clone();
                    let dispatcher = dispatcher.clone();
                    self.factory.spawn_detach(async move {
                        handle_call::<F>(factory, dispatcher, conn, id).await;
                    });
                }
            }
        }
    }
}

/// Header handshake plus driver setup for one accepted call stream.
async fn handle_call<F: ServerFactory>(
    factory: Arc<F>, dispatcher: Arc<F::Dispatch>,
    conn: <F::Acceptor as CallAcceptor>::Conn, id: u64,
) {
    let cfg = factory.get_config().clone();
    let codec = Arc::new(F::Codec::default());
    let (mut tx_half, mut rx_half) = conn.split();

    let first = match F::IO::timeout(cfg.timeout.handshake_timeout, rx_half.recv_frame()).await {
        Ok(Ok(f)) => f,
        Ok(Err(_)) => return,
        Err(()) => {
            warn!("call {}: no header frame before handshake timeout", id);
            tx_half.close();
            return;
        }
    };
    let header: CallHeader = match proto::decode_frame(&first) {
        Ok(frame) if frame.kind == FrameKind::Headers => {
            match codec.decode(frame.body) {
                Ok(h) => h,
                Err(()) => {
                    reject::<F>(tx_half, &codec, cfg.timeout.grace, Status::invalid_argument("undecodable call header"))
                        .await;
                    return;
                }
            }
        }
        _ => {
            reject::<F>(tx_half, &codec, cfg.timeout.grace, Status::invalid_argument("call stream did not start with a header frame"))
                .await;
            return;
        }
    };
    let Some(shape) = CallShape::from_wire(header.shape) else {
        reject::<F>(tx_half, &codec, cfg.timeout.grace, Status::invalid_argument("unsupported call shape"))
            .await;
        return;
    };
    let deadline = Deadline::from_timeout_ms(header.timeout_ms);

    let (out_tx, out_rx) = mpmc::bounded_async::<Vec<u8>>(cfg.window);
    let (in_tx, in_rx) = mpmc::bounded_async::<Vec<u8>>(cfg.window);
    let (done_tx, done_rx) = mpmc::unbounded_async::<()>();
    let shared = Arc::new(CallShared::new(id, header.method, shape, deadline, done_tx));
    debug!("{:?} accepted", shared);

    let _shared = shared.clone();
    let _done = done_rx.clone();
    let _codec = codec.clone();
    let grace = cfg.timeout.grace;
    factory.spawn_detach(async move {
        session::writer_loop::<_, F::IO, _>(_shared, out_rx, tx_half, _done, _codec, true, grace)
            .await;
    });
    let _shared = shared.clone();
    let _done = done_rx.clone();
    let _codec = codec.clone();
    factory.spawn_detach(async move {
        reader_loop(_shared, rx_half, in_tx, _done, _codec).await;
    });
    if let Some(dl) = deadline {
        let _shared = shared.clone();
        factory
            .spawn_detach(async move { session::deadline_watch::<F::IO>(_shared, dl, done_rx).await });
    }

    let call = ServerCall { shared, codec, out_tx, in_rx: Some(in_rx) };
    dispatcher.dispatch(call).await;
}

/// Refuse a call that never became a session: best-effort status frame
/// within the grace budget, then force-close.
async fn reject<F: ServerFactory>(
    mut tx: <<F::Acceptor as CallAcceptor>::Conn as CallConn>::Tx, codec: &F::Codec,
    grace: Duration, st: Status,
) {
    warn!("rejecting call: {:?}", st);
    let frame = proto::encode_frame(FrameKind::Status, &st.encode(codec));
    let _ = F::IO::timeout(grace, tx.send_frame(frame)).await;
    tx.close();
}

/// The serving-side reader: applies inbound cardinality, records the
/// peer's half-close, and honors CANCEL control frames.
async fn reader_loop<Rx: FrameRx, C: Codec>(
    shared: Arc<CallShared>, mut rx: Rx, in_tx: MAsyncTx<Vec<u8>>, done_rx: MAsyncRx<()>,
    codec: Arc<C>,
) {
    let mut in_tx = Some(in_tx);
    let mut inbound: u64 = 0;
    loop {
        let frame = match Cancellable::new(rx.recv_frame(), done_rx.recv()).await {
            Ok(Ok(f)) => f,
            Ok(Err(_)) => {
                // the caller vanished without a trailer
                shared.terminate(Status::unavailable("call stream broken"));
                break;
            }
            Err(()) => break,
        };
        let parsed = match proto::decode_frame(&frame) {
            Ok(p) => p,
            Err(()) => {
                shared.terminate(Status::internal("undecodable frame"));
                break;
            }
        };
        match parsed.kind {
            FrameKind::Msg => {
                if shared.status().is_some() {
                    continue;
                }
                inbound += 1;
                if shared.shape.single_request() && inbound > 1 {
                    shared.terminate(Status::failed_precondition(format!(
                        "{:?} allows a single request message",
                        shared.shape
                    )));
                    break;
                }
                let Some(tx) = in_tx.as_ref() else { continue };
                match Cancellable::new(tx.send(parsed.body.to_vec()), done_rx.recv()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(()) => break,
                }
            }
            FrameKind::CloseSend => {
                shared.recv_done.store(true, Ordering::Release);
                // closing the window channel ends the inbound sequence
                // after the queued messages drain
                in_tx.take();
            }
            FrameKind::Cancel => {
                let st = Status::decode(codec.as_ref(), parsed.body);
                shared.set_peer_terminal();
                shared.terminate(st);
                break;
            }
            FrameKind::Headers | FrameKind::Status => {
                warn!("{:?} unexpected frame {:?} from client", shared, parsed.kind);
            }
        }
    }
    trace!("{:?} reader exit", shared);
}

/// The serving side of one call session, handed to the dispatcher.
///
/// Consumed by [ServerCall::finish]; dropping it with no terminal status
/// (an aborted handler) reports INTERNAL to the caller.
pub struct ServerCall<C: Codec> {
    pub(crate) shared: Arc<CallShared>,
    pub(crate) codec: Arc<C>,
    pub(crate) out_tx: MAsyncTx<Vec<u8>>,
    pub(crate) in_rx: Option<MAsyncRx<Vec<u8>>>,
}

impl<C: Codec> ServerCall<C> {
    #[inline]
    pub fn method(&self) -> &str {
        &self.shared.method
    }

    #[inline]
    pub fn shape(&self) -> CallShape {
        self.shared.shape
    }

    #[inline]
    pub fn state(&self) -> CallState {
        self.shared.state()
    }

    #[inline]
    pub fn status(&self) -> Option<Status> {
        self.shared.status().cloned()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Remaining deadline budget, for clamping child calls issued while
    /// serving this one.
    #[inline]
    pub fn remaining(&self) -> Option<Duration> {
        self.shared.deadline.map(|d| d.remaining())
    }

    /// Next request message; None once the caller half-closed.
    pub async fn recv<T: DeserializeOwned>(&self) -> Result<Option<T>, Status> {
        let Some(rx) = self.in_rx.as_ref() else {
            return Err(Status::internal("inbound stream detached"));
        };
        match session::recv_msg_frame(&self.shared, rx).await? {
            None => Ok(None),
            Some(body) => match self.codec.decode::<T>(&body) {
                Ok(v) => Ok(Some(v)),
                Err(()) => {
                    let st = Status::invalid_argument("request decode failed");
                    self.shared.terminate(st.clone());
                    Err(st)
                }
            },
        }
    }

    /// Send one response message, subject to the shape's cardinality and
    /// the backpressure window.
    pub async fn send<T: Serialize>(&self, msg: &T) -> Result<(), Status> {
        let body = match self.codec.encode(msg) {
            Ok(b) => b,
            Err(()) => return Err(Status::internal("response encode failed")),
        };
        session::send_msg_frame(&self.shared, &self.out_tx, body, true).await
    }

    /// Finish the call with the given terminal status. The STATUS trailer
    /// is queued behind any pending responses, so the caller sees every
    /// message before the outcome.
    pub async fn finish(self, st: Status) {
        let frame = proto::encode_frame(FrameKind::Status, &st.encode(self.codec.as_ref()));
        // a failed enqueue means a terminal state already owns teardown
        let _ = self.out_tx.send(frame).await;
        self.shared.terminate(st);
    }

    pub(crate) fn outbound<T: Serialize>(&self) -> Outbound<C, T> {
        Outbound::new(self.shared.clone(), self.codec.clone(), self.out_tx.clone())
    }

    pub(crate) fn detach_inbound<T: DeserializeOwned>(&mut self) -> Inbound<C, T> {
        Inbound::new(self.shared.clone(), self.codec.clone(), self.in_rx.take())
    }
}

impl<C: Codec> Drop for ServerCall<C> {
    fn drop(&mut self) {
        if self.shared.status().is_none() {
            self.shared.terminate(Status::internal("handler aborted without a status"));
        }
    }
}

impl<C: Codec> std::fmt::Debug for ServerCall<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.shared.fmt(f)
    }
}
