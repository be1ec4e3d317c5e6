//! The server side of the Note Service: the method table, the in-memory
//! store, and the per-connection dispatcher that routes accepted calls
//! into shape-agnostic handlers.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use note_rpc_codec::MsgpCodec;
use note_rpc_core::runtime::AsyncIO;
use note_rpc_core::status::Status;
use note_rpc_core::ServerConfig;
use note_rpc_engine::mux;
use note_rpc_engine::server::{CallDispatch, ServerCall, ServerFactory};
use note_rpc_engine::transport::CallAcceptor;

use crate::note::*;

/// Domain string carried by the service's error envelopes.
pub const NOTE_DOMAIN: &str = "notes.example.com";

pub mod methods {
    use note_rpc_engine::proto::{CallDesc, CallShape};

    pub const CREATE: CallDesc =
        CallDesc { method: "NoteService/Create", shape: CallShape::Unary };
    pub const GET: CallDesc = CallDesc { method: "NoteService/Get", shape: CallShape::Unary };
    pub const LIST_BY_TAG: CallDesc =
        CallDesc { method: "NoteService/ListByTag", shape: CallShape::ServerStream };
    pub const IMPORT: CallDesc =
        CallDesc { method: "NoteService/Import", shape: CallShape::ClientStream };
    pub const SYNC: CallDesc =
        CallDesc { method: "NoteService/Sync", shape: CallShape::BidiStream };

    pub const ALL: [CallDesc; 5] = [CREATE, GET, LIST_BY_TAG, IMPORT, SYNC];

    pub fn find(method: &str) -> Option<CallDesc> {
        ALL.iter().find(|d| d.method == method).copied()
    }
}

/// In-memory note storage, insertion-ordered so streamed listings are
/// deterministic.
pub struct NoteStore {
    notes: Mutex<Vec<Note>>,
    next_id: AtomicU64,
}

impl Default for NoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteStore {
    pub fn new() -> Self {
        Self { notes: Mutex::new(Vec::new()), next_id: AtomicU64::new(1) }
    }

    fn alloc_id(&self) -> String {
        format!("note-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn validate_title(title: &str) -> Result<(), Status> {
        if title.trim().is_empty() {
            let violation = FieldViolation {
                field: "title".to_string(),
                description: "must not be empty".to_string(),
            };
            return Err(Status::invalid_argument("invalid note")
                .with_domain(NOTE_DOMAIN)
                .with_reason("TITLE_EMPTY")
                .with_detail(FIELD_VIOLATION_KIND, &violation, &MsgpCodec::default()));
        }
        Ok(())
    }

    pub fn create(&self, req: CreateNoteRequest) -> Result<Note, Status> {
        Self::validate_title(&req.title)?;
        let mut note = Note::new(req.title);
        note.id = self.alloc_id();
        note.text = req.text;
        note.tags = req.tags;
        note.labels = req.labels;
        note.visibility = req.visibility;
        let mut notes = self.lock()?;
        notes.push(note.clone());
        info!("created {}", note.id);
        Ok(note)
    }

    pub fn get(&self, id: &str) -> Result<Note, Status> {
        let notes = self.lock()?;
        match notes.iter().find(|n| n.id == id) {
            Some(n) => Ok(n.clone()),
            None => Err(Status::not_found(format!("no note with id {}", id))
                .with_domain(NOTE_DOMAIN)
                .with_reason("NOTE_MISSING")),
        }
    }

    /// Insert or replace by id; an empty id gets a fresh one.
    pub fn upsert(&self, mut note: Note) -> Result<Note, Status> {
        Self::validate_title(&note.title)?;
        if note.id.is_empty() {
            note.id = self.alloc_id();
        }
        let mut notes = self.lock()?;
        match notes.iter_mut().find(|n| n.id == note.id) {
            Some(slot) => *slot = note.clone(),
            None => notes.push(note.clone()),
        }
        Ok(note)
    }

    pub fn by_tag(&self, tag: &str) -> Result<Vec<Note>, Status> {
        let notes = self.lock()?;
        Ok(notes.iter().filter(|n| n.tags.iter().any(|t| t == tag)).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Note>>, Status> {
        self.notes.lock().map_err(|_| Status::internal("note store lock poisoned"))
    }
}

/// Per-connection dispatcher: method lookup, shape validation, and the
/// shape adapters around the store operations.
pub struct NoteDispatch {
    store: Arc<NoteStore>,
}

impl NoteDispatch {
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }

    async fn route(&self, call: ServerCall<MsgpCodec>) {
        let method = call.method().to_string();
        let Some(desc) = methods::find(&method) else {
            call.finish(
                Status::not_found(format!("unknown method {}", method))
                    .with_domain(NOTE_DOMAIN)
                    .with_reason("METHOD_NOT_FOUND"),
            )
            .await;
            return;
        };
        let called_shape = call.shape();
        if desc.shape != called_shape {
            call.finish(Status::invalid_argument(format!(
                "{} is {:?}, called as {:?}",
                method,
                desc.shape,
                called_shape
            )))
            .await;
            return;
        }

        let store = self.store.clone();
        match desc {
            d if d == methods::CREATE => {
                mux::unary(call, move |req: CreateNoteRequest| async move { store.create(req) })
                    .await;
            }
            d if d == methods::GET => {
                mux::unary(call, move |req: GetNoteRequest| async move { store.get(&req.id) })
                    .await;
            }
            d if d == methods::LIST_BY_TAG => {
                mux::server_stream(call, move |req: ListByTagRequest, sink| async move {
                    for note in store.by_tag(&req.tag)? {
                        sink.send(&note).await?;
                    }
                    Ok(())
                })
                .await;
            }
            d if d == methods::IMPORT => {
                mux::client_stream(call, move |stream| async move {
                    let mut count: u64 = 0;
                    while let Some(note) = stream.next().await? {
                        store.upsert(note)?;
                        count += 1;
                    }
                    Ok(ImportSummary { count })
                })
                .await;
            }
            d if d == methods::SYNC => {
                mux::bidi(call, move |stream, sink| async move {
                    let mut seq: u64 = 0;
                    while let Some(note) = stream.next().await? {
                        let stored = store.upsert(note)?;
                        seq += 1;
                        sink.send(&SyncEvent { id: stored.id, seq }).await?;
                    }
                    Ok(())
                })
                .await;
            }
            _ => {
                call.finish(Status::internal("method table out of sync")).await;
            }
        }
    }
}

impl<F> CallDispatch<F> for NoteDispatch
where
    F: ServerFactory<Codec = MsgpCodec>,
{
    fn dispatch(&self, call: ServerCall<MsgpCodec>) -> impl Future<Output = ()> + Send {
        self.route(call)
    }
}

/// Server factory of the Note Service: msgpack codec, caller-chosen
/// runtime and transport.
pub struct NoteServerFactory<IO, A> {
    config: ServerConfig,
    store: Arc<NoteStore>,
    io: IO,
    _acceptor: PhantomData<fn(A)>,
}

impl<IO: AsyncIO, A: CallAcceptor> NoteServerFactory<IO, A> {
    pub fn new(config: ServerConfig, store: Arc<NoteStore>, io: IO) -> Self {
        Self { config, store, io, _acceptor: PhantomData }
    }

    pub fn store(&self) -> &Arc<NoteStore> {
        &self.store
    }
}

impl<IO: AsyncIO, A: CallAcceptor> ServerFactory for NoteServerFactory<IO, A> {
    type Codec = MsgpCodec;
    type IO = IO;
    type Acceptor = A;
    type Dispatch = NoteDispatch;

    fn get_config(&self) -> &ServerConfig {
        &self.config
    }

    fn spawn_detach<F, R>(&self, f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        self.io.spawn_detach(f)
    }

    fn new_dispatcher(&self) -> NoteDispatch {
        NoteDispatch::new(self.store.clone())
    }
}
