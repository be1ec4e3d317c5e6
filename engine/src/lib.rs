#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # note-rpc-engine
//!
//! The streaming call engine of `note-rpc`. One [session::CallState]
//! lifecycle per invocation, four call shapes multiplexed onto a common
//! message-sequence surface, per-call deadlines with cooperative
//! cancellation propagated to both directions, and a structured terminal
//! status instead of bare failure codes.
//!
//! ## Components
//!
//! - [proto]: the per-call-stream frame protocol
//! - [session]: call session state and the shared driver loops
//! - [client]: the caller side ([client::RpcChannel], [client::CallSession])
//! - [server]: the serving side ([server::RpcServer], [server::ServerCall])
//! - [mux]: shape adapters that keep handler code shape-agnostic
//! - [deadline]: deadline arithmetic and child-call clamping
//! - [transport]: the traits a transport implements to carry call streams

#[macro_use]
extern crate captains_log;

pub mod client;
pub mod deadline;
pub mod mux;
pub mod proto;
pub mod server;
pub mod session;
pub mod transport;

pub use note_rpc_core::status::{Code, Status};
pub use note_rpc_core::{ClientConfig, ServerConfig, TimeoutSetting};
