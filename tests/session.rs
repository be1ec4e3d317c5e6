//! Call-engine behavior: terminal single-assignment, deadlines,
//! cancellation with pending messages, ordering and backpressure.

mod common;
use common::*;

use std::time::{Duration, Instant};

use note_rpc::{ClientConfig, Code, ServerConfig};
use note_rpc_engine::client::CallOpt;
use note_rpc_engine::session::CallState;

#[logfn]
#[rstest]
fn test_deadline_exceeded(runner: TestRunner) {
    runner.block_on(async move {
        let connector = init_test_server(ServerConfig::default());
        let channel = connect_channel(ClientConfig::default(), connector);

        // 100ms budget against a handler that waits 500ms
        let session = channel
            .start(SLOW, CallOpt::with_timeout(Duration::from_millis(100)))
            .await
            .expect("start");
        session.send(&500u64).await.expect("send");
        session.close_send().await.expect("close");

        let begin = Instant::now();
        let err = session.recv::<String>().await.expect_err("must time out");
        assert_eq!(err.code, Code::DeadlineExceeded);
        // fired at the deadline instant, within scheduling slack
        assert!(begin.elapsed() >= Duration::from_millis(90));
        assert!(begin.elapsed() < Duration::from_millis(450));
        assert_eq!(session.state(), CallState::DeadlineExceeded);

        // a late completion loses: the handler finishing afterwards cannot
        // override the terminal status
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(session.state(), CallState::DeadlineExceeded);
    });
}

#[logfn]
#[rstest]
fn test_terminal_single_assignment(runner: TestRunner) {
    runner.block_on(async move {
        let connector = init_test_server(ServerConfig::default());
        let channel = connect_channel(ClientConfig::default(), connector);

        let session = channel.start(FLOOD, CallOpt::default()).await.expect("start");
        assert_eq!(session.state(), CallState::Active);
        assert!(session.status().is_none());

        session.cancel("first");
        session.cancel("second");
        let st = session.status().expect("terminal");
        assert_eq!(st.code, Code::Cancelled);
        assert_eq!(st.message, "first");
        assert_eq!(session.state(), CallState::Cancelled);
    });
}

#[logfn]
#[rstest]
fn test_completed_ignores_late_cancel(runner: TestRunner) {
    runner.block_on(async move {
        let connector = init_test_server(ServerConfig::default());
        let channel = connect_channel(ClientConfig::default(), connector);

        let session = channel.start(SLOW, CallOpt::default()).await.expect("start");
        session.send(&1u64).await.expect("send");
        session.close_send().await.expect("close");
        assert_eq!(session.recv::<String>().await.expect("recv"), Some("done".to_string()));
        assert!(session.recv::<String>().await.expect("recv").is_none());
        assert_eq!(session.state(), CallState::Completed);

        session.cancel("too late");
        assert_eq!(session.state(), CallState::Completed);
    });
}

#[logfn]
#[rstest]
fn test_cancel_with_pending_messages(runner: TestRunner) {
    runner.block_on(async move {
        // small windows keep the producer suspended, so the trailer cannot
        // arrive before the cancel
        let config = ClientConfig { window: 2, ..Default::default() };
        let connector = init_test_server(ServerConfig { window: 2, ..Default::default() });
        let channel = connect_channel(config, connector);

        let session = channel.start(FLOOD, CallOpt::default()).await.expect("start");
        session.send(&FloodReq { count: 50 }).await.expect("send");
        session.close_send().await.expect("close");

        let first = session.recv::<u32>().await.expect("recv").expect("msg");
        assert_eq!(first, 0);

        // messages are still queued, but cancellation wins over them
        session.cancel("enough");
        let err = session.recv::<u32>().await.expect_err("cancelled");
        assert_eq!(err.code, Code::Cancelled);
        assert_eq!(session.state(), CallState::Cancelled);
    });
}

#[logfn]
#[rstest]
fn test_stream_ordering(runner: TestRunner) {
    runner.block_on(async move {
        let config = ClientConfig { window: 4, ..Default::default() };
        let connector = init_test_server(ServerConfig { window: 4, ..Default::default() });
        let channel = connect_channel(config, connector);

        let session = channel.start(FLOOD, CallOpt::default()).await.expect("start");
        session.send(&FloodReq { count: 100 }).await.expect("send");
        session.close_send().await.expect("close");

        let mut got = Vec::with_capacity(100);
        while let Some(v) = session.recv::<u32>().await.expect("recv") {
            got.push(v);
        }
        // no reordering, no drops
        let want: Vec<u32> = (0..100).collect();
        assert_eq!(got, want);
        assert_eq!(session.state(), CallState::Completed);
    });
}

#[logfn]
#[rstest]
fn test_backpressure_suspends_producer(runner: TestRunner) {
    runner.block_on(async move {
        let config = ClientConfig { window: 2, ..Default::default() };
        let connector = init_test_server(ServerConfig { window: 2, ..Default::default() });
        let channel = connect_channel(config, connector);

        let session = channel.start(FLOOD, CallOpt::default()).await.expect("start");
        session.send(&FloodReq { count: 50 }).await.expect("send");
        session.close_send().await.expect("close");

        // with everyone's window at 2 the producer must be suspended long
        // before 50 messages; no trailer can have arrived yet
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.state(), CallState::Active);

        let mut got = 0u32;
        while let Some(_v) = session.recv::<u32>().await.expect("recv") {
            got += 1;
        }
        assert_eq!(got, 50);
        assert_eq!(session.state(), CallState::Completed);
    });
}

#[logfn]
#[rstest]
fn test_unary_double_send_is_local_error(runner: TestRunner) {
    runner.block_on(async move {
        let connector = init_test_server(ServerConfig::default());
        let channel = connect_channel(ClientConfig::default(), connector);

        let session = channel.start(SLOW, CallOpt::default()).await.expect("start");
        session.send(&1u64).await.expect("first send");
        let err = session.send(&2u64).await.expect_err("second send must fail");
        assert_eq!(err.code, Code::FailedPrecondition);
        // the local usage error is not terminal; the call still completes
        session.close_send().await.expect("close");
        assert_eq!(session.recv::<String>().await.expect("recv"), Some("done".to_string()));
    });
}

#[logfn]
#[rstest]
fn test_send_after_close_send(runner: TestRunner) {
    runner.block_on(async move {
        let connector = init_test_server(ServerConfig::default());
        let channel = connect_channel(ClientConfig::default(), connector);

        let session = channel.start(ECHO, CallOpt::default()).await.expect("start");
        session.send(&"hi".to_string()).await.expect("send");
        session.close_send().await.expect("close");
        // idempotent
        session.close_send().await.expect("close again");

        let err = session.send(&"late".to_string()).await.expect_err("must fail");
        assert_eq!(err.code, Code::FailedPrecondition);

        assert_eq!(session.recv::<String>().await.expect("recv"), Some("hi".to_string()));
        assert!(session.recv::<String>().await.expect("recv").is_none());
    });
}

#[logfn]
#[rstest]
fn test_echo_interleaved(runner: TestRunner) {
    runner.block_on(async move {
        let connector = init_test_server(ServerConfig::default());
        let channel = connect_channel(ClientConfig::default(), connector);

        let session = channel.start(ECHO, CallOpt::default()).await.expect("start");
        for i in 0..20 {
            let msg = format!("msg-{}", i);
            session.send(&msg).await.expect("send");
            let back = session.recv::<String>().await.expect("recv").expect("echo");
            assert_eq!(back, msg);
        }
        session.close_send().await.expect("close");
        assert!(session.recv::<String>().await.expect("recv").is_none());
        assert_eq!(session.state(), CallState::Completed);
    });
}

#[logfn]
#[rstest]
fn test_cancel_releases_pending_recv(runner: TestRunner) {
    runner.block_on(async move {
        let connector = init_test_server(ServerConfig::default());
        let channel = connect_channel(ClientConfig::default(), connector);

        // an echo session with nothing inbound: recv parks until cancel
        let session = channel.start(ECHO, CallOpt::default()).await.expect("start");
        let session = std::sync::Arc::new(session);
        let _session = session.clone();
        let waiter = tokio::spawn(async move { _session.recv::<String>().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.cancel("walk away");

        let got = waiter.await.expect("join").expect_err("cancelled");
        assert_eq!(got.code, Code::Cancelled);
    });
}
