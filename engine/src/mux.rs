//! Shape adapters over the common message-sequence surface.
//!
//! The call shape is a closed variant consumed exactly once here; handler
//! code stays shape-agnostic apart from the cardinality the adapters
//! enforce. Each adapter owns finishing the call, so a handler can only
//! produce messages and an outcome, never a half-torn session.

use std::marker::PhantomData;
use std::sync::Arc;

use crossfire::*;
use note_rpc_core::status::Status;
use note_rpc_core::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

use crate::server::ServerCall;
use crate::session::{self, CallShared};

/// The typed inbound message sequence of a call, in peer send order.
pub struct Inbound<C: Codec, T> {
    shared: Arc<CallShared>,
    codec: Arc<C>,
    in_rx: Option<MAsyncRx<Vec<u8>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<C: Codec, T: DeserializeOwned> Inbound<C, T> {
    pub(crate) fn new(
        shared: Arc<CallShared>, codec: Arc<C>, in_rx: Option<MAsyncRx<Vec<u8>>>,
    ) -> Self {
        Self { shared, codec, in_rx, _marker: PhantomData }
    }

    /// Next message; None once the peer half-closed its send direction.
    pub async fn next(&self) -> Result<Option<T>, Status> {
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
}

/// The typed outbound sink of a call; send applies the backpressure window.
pub struct Outbound<C: Codec, T> {
    shared: Arc<CallShared>,
    codec: Arc<C>,
    out_tx: MAsyncTx<Vec<u8>>,
    _marker: PhantomData<fn(T)>,
}

impl<C: Codec, T: Serialize> Outbound<C, T> {
    pub(crate) fn new(shared: Arc<CallShared>, codec: Arc<C>, out_tx: MAsyncTx<Vec<u8>>) -> Self {
        Self { shared, codec, out_tx, _marker: PhantomData }
    }

    pub async fn send(&self, msg: &T) -> Result<(), Status> {
        let body = match self.codec.encode(msg) {
            Ok(b) => b,
            Err(()) => return Err(Status::internal("response encode failed")),
        };
        session::send_msg_frame(&self.shared, &self.out_tx, body, true).await
    }

    /// Cooperative cancellation probe for long-running producers.
    #[inline]
    pub fn check_live(&self) -> Result<(), Status> {
        self.shared.check_live()
    }
}

/// Unary: exactly one request, exactly one response.
pub async fn unary<C, Req, Resp, H, Fut>(call: ServerCall<C>, handler: H)
where
    C: Codec,
    Req: DeserializeOwned + Send,
    Resp: Serialize + Send,
    H: FnOnce(Req) -> Fut + Send,
    Fut: Future<Output = Result<Resp, Status>> + Send,
{
    match call.recv::<Req>().await {
        Err(st) => debug!("{:?} ended before the request: {:?}", call, st),
        Ok(None) => call.finish(Status::invalid_argument("missing request message")).await,
        Ok(Some(req)) => match handler(req).await {
            Ok(resp) => match call.send(&resp).await {
                Ok(()) => call.finish(Status::ok()).await,
                Err(st) => debug!("{:?} response rejected: {:?}", call, st),
            },
            Err(st) => call.finish(st).await,
        },
    }
}

/// Server-streaming: one request, zero-or-more responses through the sink.
pub async fn server_stream<C, Req, Resp, H, Fut>(call: ServerCall<C>, handler: H)
where
    C: Codec,
    Req: DeserializeOwned + Send,
    Resp: Serialize + Send,
    H: FnOnce(Req, Outbound<C, Resp>) -> Fut + Send,
    Fut: Future<Output = Result<(), Status>> + Send,
{
    match call.recv::<Req>().await {
        Err(st) => debug!("{:?} ended before the request: {:?}", call, st),
        Ok(None) => call.finish(Status::invalid_argument("missing request message")).await,
        Ok(Some(req)) => {
            let sink = call.outbound::<Resp>();
            match handler(req, sink).await {
                Ok(()) => call.finish(Status::ok()).await,
                Err(st) => call.finish(st).await,
            }
        }
    }
}

/// Client-streaming: the handler drains the inbound sequence until the
/// caller half-closes, then the engine sends the single summary response.
pub async fn client_stream<C, Req, Resp, H, Fut>(mut call: ServerCall<C>, handler: H)
where
    C: Codec,
    Req: DeserializeOwned + Send,
    Resp: Serialize + Send,
    H: FnOnce(Inbound<C, Req>) -> Fut + Send,
    Fut: Future<Output = Result<Resp, Status>> + Send,
{
    let stream = call.detach_inbound::<Req>();
    match handler(stream).await {
        Ok(resp) => match call.send(&resp).await {
            Ok(()) => call.finish(Status::ok()).await,
            Err(st) => debug!("{:?} summary rejected: {:?}", call, st),
        },
        Err(st) => call.finish(st).await,
    }
}

/// Bidirectional: inbound and outbound fully independent; the handler may
/// interleave arbitrarily and either direction can close on its own.
pub async fn bidi<C, Req, Resp, H, Fut>(mut call: ServerCall<C>, handler: H)
where
    C: Codec,
    Req: DeserializeOwned + Send,
    Resp: Serialize + Send,
    H: FnOnce(Inbound<C, Req>, Outbound<C, Resp>) -> Fut + Send,
    Fut: Future<Output = Result<(), Status>> + Send,
{
    let stream = call.detach_inbound::<Req>();
    let sink = call.outbound::<Resp>();
    match handler(stream, sink).await {
        Ok(()) => call.finish(Status::ok()).await,
        Err(st) => call.finish(st).await,
    }
}
