#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # note-rpc
//!
//! The Note Service: a small note-keeping RPC service that exercises every
//! call shape of the `note-rpc-engine` — unary create/get, server-streaming
//! listing, client-streaming import and bidirectional sync — with
//! structured error envelopes on failure.
//!
//! ## Components
//!
//! `note-rpc` is built from a collection of crates:
//!
//! - `note-rpc-core`: codec trait, status envelope, config, runtime adapter interface.
//! - `note-rpc-codec`: serialization codecs, such as `msgpack`.
//! - `note-rpc-engine`: the streaming call engine.
//! - `note-rpc-tokio`: a runtime adapter for the `tokio` runtime.
//! - `note-rpc-mem`: an in-process transport.

#[macro_use]
extern crate captains_log;

pub mod client;
pub mod note;
pub mod service;

pub use note_rpc_core::status::{Code, ErrorDetail, Status};
pub use note_rpc_core::{ClientConfig, ServerConfig};
