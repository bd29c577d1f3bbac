//! Scenario 1 (SPEC_FULL.md §8): single backend, happy path.

mod common;

use msgproxy::state::ProxyState;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test]
async fn client_req_round_trips_through_single_backend() {
    let backend = common::ScriptedAckBackend::start("OK:world").await;
    let state = ProxyState::with_backend_tuning(common::fast_tuning());
    let proxy_port = common::spawn_proxy(state.clone()).await;
    common::register_backend(proxy_port, backend.port).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
    client
        .write_all(b"OPERACION:CLIENT_REQ;USER:alice\nHELLO\n")
        .await
        .unwrap();

    let mut buf = vec![0u8; 256];
    let n = client.read(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);
    assert_eq!(response, "OPERACION:RESPUESTA\nOK:world\n");

    assert_eq!(state.journal().len().await, 1);
}

#[tokio::test]
async fn message_operation_returns_bare_backend_reply() {
    let backend = common::ScriptedAckBackend::start("PONG").await;
    let state = ProxyState::with_backend_tuning(common::fast_tuning());
    let proxy_port = common::spawn_proxy(state.clone()).await;
    common::register_backend(proxy_port, backend.port).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
    client.write_all(b"OPERACION:MESSAGE\nPING\n").await.unwrap();

    let mut reader = BufReader::new(client);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line.trim_end(), "PONG");
}
