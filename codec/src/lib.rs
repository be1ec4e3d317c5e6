#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # note-rpc-codec
//!
//! This crate provides [note_rpc_core::Codec] implementations for the
//! `note-rpc` workspace. It supports different serialization formats,
//! currently `msgpack`.

pub use note_rpc_core::Codec;
#[cfg(feature = "msgpack")]
mod msgpack;
#[cfg(feature = "msgpack")]
pub use msgpack::*;
