//! The caller side of the engine.
//!
//! [RpcChannel] is the explicit per-connection context (no ambient global
//! state); [CallSession] owns one invocation end to end and is the single
//! source of truth for its outcome.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossfire::*;
use note_rpc_core::io::Cancellable;
use note_rpc_core::runtime::AsyncIO;
use note_rpc_core::status::Status;
use note_rpc_core::{ClientConfig, Codec};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::deadline::{clamp_child, Deadline};
use crate::proto::{self, CallDesc, CallHeader, FrameKind};
use crate::session::{self, CallShared, CallState};
use crate::transport::{CallConn, CallConnector, FrameRx};

/// A central hub defined by the user for the caller side, tying together
/// the codec, the async runtime and the transport.
pub trait ClientFactory: Send + Sync + Sized + 'static {
    type Codec: Codec;
    type IO: AsyncIO;
    type Connector: CallConnector;

    fn get_config(&self) -> &ClientConfig;

    /// Define how the async runtime spawns a detached coroutine
    fn spawn_detach<F, R>(&self, f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static;
}

/// Per-call options. The timeout is relative here and becomes an absolute
/// deadline the moment the call starts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallOpt {
    pub timeout: Option<Duration>,
}

impl CallOpt {
    #[inline]
    pub fn with_timeout(d: Duration) -> Self {
        Self { timeout: Some(d) }
    }

    /// Clamp this option against the remaining budget of an enclosing call;
    /// the child never outlives the parent.
    #[inline]
    pub fn within_parent(self, parent_remaining: Option<Duration>) -> Self {
        Self { timeout: clamp_child(self.timeout, parent_remaining) }
    }
}

/// One logical connection to a server; many concurrent call sessions
/// multiplex over it without one slow call blocking another.
pub struct RpcChannel<F: ClientFactory> {
    factory: Arc<F>,
    connector: F::Connector,
    codec: Arc<F::Codec>,
    next_id: AtomicU64,
}

impl<F: ClientFactory> RpcChannel<F> {
    pub fn new(factory: Arc<F>, connector: F::Connector) -> Self {
        Self { factory, connector, codec: Arc::new(F::Codec::default()), next_id: AtomicU64::new(1) }
    }

    #[inline]
    pub fn get_codec(&self) -> &F::Codec {
        &self.codec
    }

    /// Start a call session of the given descriptor.
    ///
    /// The HEADERS frame (method, shape, relative timeout) is queued before
    /// the drivers start, so it is always the first frame on the stream.
    pub async fn start(&self, desc: CallDesc, opt: CallOpt) -> Result<CallSession<F::Codec>, Status> {
        let conn = match self.connector.open_call().await {
            Ok(c) => c,
            Err(_) => return Err(Status::unavailable("cannot open call stream")),
        };
        let cfg = self.factory.get_config();
        let timeout = opt.timeout.or(cfg.timeout.call_timeout);
        let deadline = timeout.map(Deadline::after);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let (out_tx, out_rx) = mpmc::bounded_async::<Vec<u8>>(cfg.window);
        let (in_tx, in_rx) = mpmc::bounded_async::<Vec<u8>>(cfg.window);
        let (done_tx, done_rx) = mpmc::unbounded_async::<()>();
        let shared =
            Arc::new(CallShared::new(id, desc.method.to_string(), desc.shape, deadline, done_tx));

        let header = CallHeader::new(&desc, deadline);
        let body = match self.codec.encode(&header) {
            Ok(b) => b,
            Err(()) => return Err(Status::internal("call header encode failed")),
        };
        if out_tx.send(proto::encode_frame(FrameKind::Headers, &body)).await.is_err() {
            return Err(Status::unavailable("call stream closed"));
        }

        let (tx_half, rx_half) = conn.split();
        let grace = cfg.timeout.grace;
        let _shared = shared.clone();
        let _done = done_rx.clone();
        let _codec = self.codec.clone();
        self.factory.spawn_detach(async move {
            session::writer_loop::<_, F::IO, _>(_shared, out_rx, tx_half, _done, _codec, false, grace)
                .await;
        });
        let _shared = shared.clone();
        let _done = done_rx.clone();
        let _codec = self.codec.clone();
        self.factory.spawn_detach(async move {
            reader_loop(_shared, rx_half, in_tx, _done, _codec).await;
        });
        if let Some(dl) = deadline {
            let _shared = shared.clone();
            self.factory
                .spawn_detach(async move { session::deadline_watch::<F::IO>(_shared, dl, done_rx).await });
        }
        debug!("{:?} started", shared);
        Ok(CallSession { shared, codec: self.codec.clone(), out_tx, in_rx })
    }
}

/// The inbound driver of a caller-side session: application messages go
/// into the bounded window; the STATUS trailer claims the terminal state.
async fn reader_loop<Rx: FrameRx, C: Codec>(
    shared: Arc<CallShared>, mut rx: Rx, in_tx: MAsyncTx<Vec<u8>>, done_rx: MAsyncRx<()>,
    codec: Arc<C>,
) {
    loop {
        let frame = match Cancellable::new(rx.recv_frame(), done_rx.recv()).await {
            Ok(Ok(f)) => f,
            Ok(Err(_)) => {
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
                    // no application data past a terminal transition
                    continue;
                }
                match Cancellable::new(in_tx.send(parsed.body.to_vec()), done_rx.recv()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(()) => break,
                }
            }
            FrameKind::Status | FrameKind::Cancel => {
                let st = Status::decode(codec.as_ref(), parsed.body);
                shared.set_peer_terminal();
                shared.recv_done.store(true, Ordering::Release);
                shared.terminate(st);
                break;
            }
            FrameKind::Headers | FrameKind::CloseSend => {
                warn!("{:?} unexpected frame {:?} from server", shared, parsed.kind);
            }
        }
    }
    trace!("{:?} reader exit", shared);
}

/// A caller-side call session.
///
/// On Drop without a terminal status, the call is cancelled so abandoned
/// sessions cannot leak their drivers.
pub struct CallSession<C: Codec> {
    shared: Arc<CallShared>,
    codec: Arc<C>,
    out_tx: MAsyncTx<Vec<u8>>,
    in_rx: MAsyncRx<Vec<u8>>,
}

impl<C: Codec> CallSession<C> {
    #[inline]
    pub fn state(&self) -> CallState {
        self.shared.state()
    }

    /// The terminal status once known, else None. Never blocks.
    #[inline]
    pub fn status(&self) -> Option<Status> {
        self.shared.status().cloned()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Send one application message. Suspends while the backpressure window
    /// is full; fails with FAILED_PRECONDITION after close_send or beyond
    /// the shape's cardinality, and with the terminal status after one
    /// exists.
    pub async fn send<T: Serialize>(&self, msg: &T) -> Result<(), Status> {
        let body = match self.codec.encode(msg) {
            Ok(b) => b,
            Err(()) => return Err(Status::internal("message encode failed")),
        };
        session::send_msg_frame(&self.shared, &self.out_tx, body, false).await
    }

    /// Mark the outbound direction complete. Idempotent.
    pub async fn close_send(&self) -> Result<(), Status> {
        session::close_send(&self.shared, &self.out_tx).await
    }

    /// Next inbound message, None at the clean end of the stream, or the
    /// terminal status. Messages arrive in the order the peer sent them.
    pub async fn recv<T: DeserializeOwned>(&self) -> Result<Option<T>, Status> {
        match session::recv_msg_frame(&self.shared, &self.in_rx).await? {
            None => Ok(None),
            Some(body) => match self.codec.decode::<T>(&body) {
                Ok(v) => Ok(Some(v)),
                Err(()) => {
                    let st = Status::internal("response decode failed");
                    self.shared.terminate(st.clone());
                    Err(st)
                }
            },
        }
    }

    /// Irreversibly cancel the session. The peer is notified
    /// asynchronously and both directions reject application data from here
    /// on; pending operations resolve with CANCELLED.
    pub fn cancel(&self, reason: &str) {
        self.shared.cancel(reason);
    }
}

impl<C: Codec> Drop for CallSession<C> {
    fn drop(&mut self) {
        if self.shared.status().is_none() {
            self.shared.cancel("session dropped");
        }
    }
}

impl<C: Codec> std::fmt::Debug for CallSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.shared.fmt(f)
    }
}
