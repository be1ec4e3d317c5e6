//! Call session state shared between the user-facing handles and the
//! engine's driver coroutines.
//!
//! One session is touched by exactly two logical parties: the handler /
//! caller logic and the engine's I/O drivers. The terminal status is a
//! single-assignment cell (first writer wins, later writers no-op), and the
//! teardown wake-up is a close channel: dropping the `done` sender releases
//! every driver blocked at a suspension point.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crossfire::*;
use note_rpc_core::io::Cancellable;
use note_rpc_core::runtime::AsyncIO;
use note_rpc_core::status::{Code, Status};
use note_rpc_core::Codec;

use crate::deadline::Deadline;
use crate::proto::{self, CallShape, FrameKind};
use crate::transport::FrameTx;

/// Observable lifecycle of a call session.
///
/// A session object only exists once the call has started, so `Active` is
/// the entry state; the four terminal states are mutually exclusive and
/// entered exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Active,
    Completed,
    Cancelled,
    DeadlineExceeded,
    Failed,
}

pub(crate) struct CallShared {
    pub(crate) id: u64,
    pub(crate) method: String,
    pub(crate) shape: CallShape,
    pub(crate) deadline: Option<Deadline>,
    cancelled: AtomicBool,
    terminal: OnceLock<Status>,
    /// Dropped on the first terminal transition; every driver loop selects
    /// on the paired receiver.
    done_tx: Mutex<Option<MTx<()>>>,
    /// Outbound application messages sent so far (cardinality accounting)
    pub(crate) sent: AtomicU64,
    pub(crate) send_closed: AtomicBool,
    /// The inbound direction was half-closed cleanly by the peer
    pub(crate) recv_done: AtomicBool,
    /// The terminal status originated from the peer, so no control frame
    /// needs to travel back on teardown
    peer_terminal: AtomicBool,
}

impl fmt::Debug for CallShared {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[call {} {}({:?})]", self.id, self.method, self.shape)
    }
}

impl CallShared {
    pub(crate) fn new(
        id: u64, method: String, shape: CallShape, deadline: Option<Deadline>, done_tx: MTx<()>,
    ) -> Self {
        Self {
            id,
            method,
            shape,
            deadline,
            cancelled: AtomicBool::new(false),
            terminal: OnceLock::new(),
            done_tx: Mutex::new(Some(done_tx)),
            sent: AtomicU64::new(0),
            send_closed: AtomicBool::new(false),
            recv_done: AtomicBool::new(false),
            peer_terminal: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn status(&self) -> Option<&Status> {
        self.terminal.get()
    }

    pub(crate) fn state(&self) -> CallState {
        match self.terminal.get() {
            None => CallState::Active,
            Some(st) => match st.code {
                Code::Ok => CallState::Completed,
                Code::Cancelled => CallState::Cancelled,
                Code::DeadlineExceeded => CallState::DeadlineExceeded,
                _ => CallState::Failed,
            },
        }
    }

    /// Claim the terminal status. First writer wins; later signals no-op.
    /// Returns whether this call claimed it.
    pub(crate) fn terminate(&self, st: Status) -> bool {
        let won = self.terminal.set(st).is_ok();
        if won {
            debug!("{:?} terminal: {:?}", self, self.terminal.get());
            if let Ok(mut guard) = self.done_tx.lock() {
                guard.take();
            }
        }
        won
    }

    pub(crate) fn set_peer_terminal(&self) {
        self.peer_terminal.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub(crate) fn is_peer_terminal(&self) -> bool {
        self.peer_terminal.load(Ordering::Acquire)
    }

    /// The cancellation flag is monotonic; once set it never reverts.
    pub(crate) fn cancel(&self, reason: &str) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.terminate(Status::cancelled(reason));
    }

    /// Cooperative check performed at every suspension point.
    #[inline]
    pub(crate) fn check_live(&self) -> Result<(), Status> {
        match self.status() {
            Some(st) => Err(st.clone()),
            None => Ok(()),
        }
    }
}

/// At most one outbound application message for this side of the shape?
#[inline]
pub(crate) fn outbound_limit(shape: CallShape, server: bool) -> Option<u64> {
    let single = if server { shape.single_response() } else { shape.single_request() };
    if single {
        Some(1)
    } else {
        None
    }
}

/// Encode-free send half: the body is already serialized by the typed layer.
///
/// Suspends when the backpressure window is full; a terminal transition
/// while suspended resolves with the terminal status.
pub(crate) async fn send_msg_frame(
    shared: &CallShared, out_tx: &MAsyncTx<Vec<u8>>, body: Vec<u8>, server: bool,
) -> Result<(), Status> {
    if let Some(st) = shared.status() {
        // a completed call rejects data as a usage error; an aborted one
        // reports what terminated it
        if st.is_ok() {
            return Err(Status::failed_precondition("call already completed"));
        }
        return Err(st.clone());
    }
    if shared.send_closed.load(Ordering::Acquire) {
        return Err(Status::failed_precondition("send after close_send"));
    }
    if let Some(limit) = outbound_limit(shared.shape, server) {
        if shared.sent.load(Ordering::SeqCst) >= limit {
            return Err(Status::failed_precondition(format!(
                "{:?} allows a single message in this direction",
                shared.shape
            )));
        }
    }
    let frame = proto::encode_frame(FrameKind::Msg, &body);
    match out_tx.send(frame).await {
        Ok(()) => {
            shared.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        Err(_) => Err(closed_status(shared)),
    }
}

/// Mark the outbound direction complete. Idempotent.
pub(crate) async fn close_send(
    shared: &CallShared, out_tx: &MAsyncTx<Vec<u8>>,
) -> Result<(), Status> {
    if shared.send_closed.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    if shared.status().is_some() {
        // teardown already owns the stream
        return Ok(());
    }
    let _ = out_tx.send(proto::encode_frame(FrameKind::CloseSend, b"")).await;
    Ok(())
}

/// Receive half: None is a clean end of the inbound sequence.
///
/// A non-OK terminal status wins over messages still queued: cancelling a
/// session with unread messages yields the status, not a silent success.
pub(crate) async fn recv_msg_frame(
    shared: &CallShared, in_rx: &MAsyncRx<Vec<u8>>,
) -> Result<Option<Vec<u8>>, Status> {
    if let Some(st) = shared.status() {
        if !st.is_ok() {
            return Err(st.clone());
        }
    }
    match in_rx.recv().await {
        Ok(body) => Ok(Some(body)),
        Err(_) => match shared.status() {
            Some(st) => {
                if st.is_ok() {
                    Ok(None)
                } else {
                    Err(st.clone())
                }
            }
            None => {
                if shared.recv_done.load(Ordering::Acquire) {
                    Ok(None)
                } else {
                    Err(closed_status(shared))
                }
            }
        },
    }
}

#[inline]
pub(crate) fn closed_status(shared: &CallShared) -> Status {
    match shared.status() {
        Some(st) => st.clone(),
        None => Status::unavailable("call stream broken"),
    }
}

/// The outbound driver: forwards queued frames onto the transport until a
/// terminal transition, then runs the grace-bounded teardown.
pub(crate) async fn writer_loop<Tx, IO, C>(
    shared: Arc<CallShared>, out_rx: MAsyncRx<Vec<u8>>, mut tx: Tx, done_rx: MAsyncRx<()>,
    codec: Arc<C>, server: bool, grace: Duration,
) where
    Tx: FrameTx,
    IO: AsyncIO,
    C: Codec,
{
    loop {
        match Cancellable::new(out_rx.recv(), done_rx.recv()).await {
            Ok(Ok(frame)) => {
                match Cancellable::new(tx.send_frame(frame), done_rx.recv()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => {
                        shared.terminate(Status::unavailable("call stream broken"));
                        break;
                    }
                    // terminal transition while suspended on a full window
                    Err(()) => break,
                }
            }
            // every user-side sender is gone; Drop has claimed a terminal
            Ok(Err(_)) => break,
            Err(()) => break,
        }
    }
    let st = match shared.status() {
        Some(st) => st.clone(),
        None => {
            // only reachable through transport failure above
            closed_status(&shared)
        }
    };
    let _ = IO::timeout(grace, async {
        if st.is_ok() {
            // normal completion: flush what the handler queued, including
            // the STATUS trailer
            while let Ok(frame) = out_rx.try_recv() {
                if tx.send_frame(frame).await.is_err() {
                    return;
                }
            }
        } else if !shared.is_peer_terminal() {
            // tell the peer which terminal state won
            let kind = if server { FrameKind::Status } else { FrameKind::Cancel };
            let frame = proto::encode_frame(kind, &st.encode(codec.as_ref()));
            let _ = tx.send_frame(frame).await;
        }
    })
    .await;
    tx.close();
    trace!("{:?} writer exit", shared);
}

/// Fires at the deadline instant; if no terminal status exists yet, claims
/// DeadlineExceeded and triggers the same teardown path as cancel.
pub(crate) async fn deadline_watch<IO: AsyncIO>(
    shared: Arc<CallShared>, dl: Deadline, done_rx: MAsyncRx<()>,
) {
    match Cancellable::new(IO::sleep(dl.remaining()), done_rx.recv()).await {
        Ok(_) => {
            shared.terminate(Status::deadline_exceeded(format!(
                "deadline lapsed for {}",
                shared.method
            )));
        }
        // a terminal status beat the timer
        Err(()) => {}
    }
}
