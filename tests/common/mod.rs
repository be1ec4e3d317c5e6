//! Shared fixtures for the integration tests: a tokio-backed runner with
//! the captains-log test recipe, plus factories wiring the msgpack codec,
//! the tokio adapter and the in-process transport together.

#![allow(dead_code)]

pub use captains_log::*;
pub use rstest::*;

use std::future::Future;
use std::sync::Arc;

use note_rpc::client::NoteClient;
use note_rpc::service::{NoteServerFactory, NoteStore};
use note_rpc::{ClientConfig, ServerConfig, Status};
use note_rpc_codec::MsgpCodec;
use note_rpc_engine::client::{ClientFactory, RpcChannel};
use note_rpc_engine::mux;
use note_rpc_engine::proto::{CallDesc, CallShape};
use note_rpc_engine::server::{CallDispatch, RpcServer, ServerCall, ServerFactory};
use note_rpc_mem::{MemAcceptor, MemConnector};
use note_rpc_tokio::TokioRT;
use tokio::runtime::Runtime;

#[derive(Debug)]
pub struct TestRunner {
    rt: Runtime,
}

impl TestRunner {
    pub fn new() -> Self {
        recipe::raw_file_logger("/tmp/note_rpc_test.log", Level::Trace).test().build().expect("log");
        Self {
            rt: tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap(),
        }
    }

    pub fn block_on<F: Future<Output = ()> + Send + 'static>(&self, f: F) {
        self.rt.block_on(f);
    }
}

#[fixture]
pub fn runner() -> TestRunner {
    TestRunner::new()
}

pub struct TestClientFactory {
    config: ClientConfig,
    rt: TokioRT,
}

impl ClientFactory for TestClientFactory {
    type Codec = MsgpCodec;
    type IO = TokioRT;
    type Connector = MemConnector;

    fn get_config(&self) -> &ClientConfig {
        &self.config
    }

    fn spawn_detach<F, R>(&self, f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        use note_rpc_core::runtime::AsyncIO;
        self.rt.spawn_detach(f)
    }
}

/// Spin up a Note Service on an in-process connection; returns the store
/// and the client endpoint. Must be called on the runner's runtime.
pub fn init_note_server(config: ServerConfig) -> (Arc<NoteStore>, MemConnector) {
    let window = config.window;
    let (connector, acceptor) = note_rpc_mem::pair(window);
    let store = Arc::new(NoteStore::new());
    let factory = Arc::new(NoteServerFactory::<TokioRT, MemAcceptor>::new(
        config,
        store.clone(),
        TokioRT::current(),
    ));
    let server = RpcServer::new(factory);
    tokio::spawn(async move { server.serve_conn(acceptor).await });
    (store, connector)
}

pub fn connect_channel(
    config: ClientConfig, connector: MemConnector,
) -> RpcChannel<TestClientFactory> {
    let factory = Arc::new(TestClientFactory { config, rt: TokioRT::current() });
    RpcChannel::new(factory, connector)
}

pub fn connect_client(
    config: ClientConfig, connector: MemConnector,
) -> NoteClient<TestClientFactory> {
    NoteClient::new(connect_channel(config, connector))
}

// A minimal service for engine-behavior tests: a delayed unary echo, a
// counting flood stream, and a bidi echo.

pub const ECHO: CallDesc = CallDesc { method: "Test/Echo", shape: CallShape::BidiStream };
pub const SLOW: CallDesc = CallDesc { method: "Test/Slow", shape: CallShape::Unary };
pub const FLOOD: CallDesc = CallDesc { method: "Test/Flood", shape: CallShape::ServerStream };

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FloodReq {
    pub count: u32,
}

pub struct TestDispatch;

impl TestDispatch {
    async fn route(&self, call: ServerCall<MsgpCodec>) {
        match call.method() {
            m if m == SLOW.method => {
                mux::unary(call, |delay_ms: u64| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    Ok::<String, Status>("done".to_string())
                })
                .await;
            }
            m if m == FLOOD.method => {
                mux::server_stream(call, |req: FloodReq, sink| async move {
                    for i in 0..req.count {
                        sink.send(&i).await?;
                    }
                    Ok(())
                })
                .await;
            }
            m if m == ECHO.method => {
                mux::bidi(call, |stream, sink| async move {
                    while let Some(msg) = stream.next().await? {
                        let msg: String = msg;
                        sink.send(&msg).await?;
                    }
                    Ok(())
                })
                .await;
            }
            other => {
                let st = Status::not_found(format!("unknown method {}", other));
                call.finish(st).await;
            }
        }
    }
}

impl<F> CallDispatch<F> for TestDispatch
where
    F: ServerFactory<Codec = MsgpCodec>,
{
    fn dispatch(&self, call: ServerCall<MsgpCodec>) -> impl Future<Output = ()> + Send {
        self.route(call)
    }
}

pub struct TestServerFactory {
    config: ServerConfig,
    rt: TokioRT,
}

impl ServerFactory for TestServerFactory {
    type Codec = MsgpCodec;
    type IO = TokioRT;
    type Acceptor = MemAcceptor;
    type Dispatch = TestDispatch;

    fn get_config(&self) -> &ServerConfig {
        &self.config
    }

    fn spawn_detach<F, R>(&self, f: F)
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        use note_rpc_core::runtime::AsyncIO;
        self.rt.spawn_detach(f)
    }

    fn new_dispatcher(&self) -> TestDispatch {
        TestDispatch
    }
}

/// Spin up the test service; returns the client endpoint.
pub fn init_test_server(config: ServerConfig) -> MemConnector {
    let window = config.window;
    let (connector, acceptor) = note_rpc_mem::pair(window);
    let factory = Arc::new(TestServerFactory { config, rt: TokioRT::current() });
    let server = RpcServer::new(factory);
    tokio::spawn(async move { server.serve_conn(acceptor).await });
    connector
}
