//! The typed client of the Note Service: one wrapper per method over the
//! engine's call sessions.

use note_rpc_core::status::Status;
use note_rpc_core::Codec;
use note_rpc_engine::client::{CallOpt, CallSession, ClientFactory, RpcChannel};
use note_rpc_engine::proto::CallDesc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::note::*;
use crate::service::methods;

pub struct NoteClient<F: ClientFactory> {
    channel: RpcChannel<F>,
}

impl<F: ClientFactory> NoteClient<F> {
    pub fn new(channel: RpcChannel<F>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &RpcChannel<F> {
        &self.channel
    }

    /// Unary helper: single request, single response, then the trailer.
    async fn unary<Req, Resp>(
        &self, desc: CallDesc, req: &Req, opt: CallOpt,
    ) -> Result<Resp, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let session = self.channel.start(desc, opt).await?;
        session.send(req).await?;
        session.close_send().await?;
        let resp = match session.recv::<Resp>().await? {
            Some(resp) => resp,
            None => return Err(Status::internal("unary call completed without a response")),
        };
        // drain to the trailer so a failed call surfaces its status
        match session.recv::<Resp>().await {
            Ok(None) => Ok(resp),
            Ok(Some(_)) => Err(Status::internal("unary call produced more than one response")),
            Err(st) => Err(st),
        }
    }

    pub async fn create(&self, req: CreateNoteRequest, opt: CallOpt) -> Result<Note, Status> {
        self.unary(methods::CREATE, &req, opt).await
    }

    pub async fn get(&self, id: impl Into<String>, opt: CallOpt) -> Result<Note, Status> {
        self.unary(methods::GET, &GetNoteRequest { id: id.into() }, opt).await
    }

    /// Server-streaming listing; the returned stream yields notes in the
    /// order the server emitted them.
    pub async fn list_by_tag(
        &self, tag: impl Into<String>, opt: CallOpt,
    ) -> Result<NoteStream<F::Codec>, Status> {
        let session = self.channel.start(methods::LIST_BY_TAG, opt).await?;
        session.send(&ListByTagRequest { tag: tag.into() }).await?;
        session.close_send().await?;
        Ok(NoteStream { session })
    }

    /// Client-streaming import; feed notes into the sink, then
    /// [ImportSink::finish] for the summary.
    pub async fn import(&self, opt: CallOpt) -> Result<ImportSink<F::Codec>, Status> {
        let session = self.channel.start(methods::IMPORT, opt).await?;
        Ok(ImportSink { session })
    }

    /// Bidirectional sync; sends and acks are independent sequences.
    pub async fn sync(&self, opt: CallOpt) -> Result<SyncHandle<F::Codec>, Status> {
        let session = self.channel.start(methods::SYNC, opt).await?;
        Ok(SyncHandle { session })
    }
}

pub struct NoteStream<C: Codec> {
    session: CallSession<C>,
}

impl<C: Codec> NoteStream<C> {
    /// Next note, or None at the clean end of the listing.
    pub async fn next(&self) -> Result<Option<Note>, Status> {
        self.session.recv().await
    }

    pub fn cancel(&self, reason: &str) {
        self.session.cancel(reason);
    }

    pub fn status(&self) -> Option<Status> {
        self.session.status()
    }
}

pub struct ImportSink<C: Codec> {
    session: CallSession<C>,
}

impl<C: Codec> ImportSink<C> {
    pub async fn send(&self, note: &Note) -> Result<(), Status> {
        self.session.send(note).await
    }

    /// Half-close the upload and wait for the summary.
    pub async fn finish(self) -> Result<ImportSummary, Status> {
        self.session.close_send().await?;
        let summary = match self.session.recv::<ImportSummary>().await? {
            Some(s) => s,
            None => return Err(Status::internal("import completed without a summary")),
        };
        match self.session.recv::<ImportSummary>().await {
            Ok(None) => Ok(summary),
            Ok(Some(_)) => Err(Status::internal("import produced more than one summary")),
            Err(st) => Err(st),
        }
    }

    pub fn cancel(&self, reason: &str) {
        self.session.cancel(reason);
    }
}

pub struct SyncHandle<C: Codec> {
    session: CallSession<C>,
}

impl<C: Codec> SyncHandle<C> {
    pub async fn send(&self, note: &Note) -> Result<(), Status> {
        self.session.send(note).await
    }

    /// Finish this side's upload; the server keeps streaming acks it still
    /// owes and then closes with its trailer.
    pub async fn close_send(&self) -> Result<(), Status> {
        self.session.close_send().await
    }

    pub async fn next_event(&self) -> Result<Option<SyncEvent>, Status> {
        self.session.recv().await
    }

    pub fn cancel(&self, reason: &str) {
        self.session.cancel(reason);
    }

    pub fn status(&self) -> Option<Status> {
        self.session.status()
    }
}
