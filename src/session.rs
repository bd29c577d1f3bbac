//! Per-client session handler (SPEC_FULL.md §4.F).
//!
//! One handler per accepted TCP connection. Reads header lines in a loop
//! — a connection may carry multiple operations — except `REGISTER`,
//! which is one-shot. Classification is a total match over the typed
//! [`Operation`] enum (SPEC_FULL.md REDESIGN FLAGS), so an unhandled
//! variant is a compile error rather than a silently dropped case.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{synthesize_address, TcpBackend};
use crate::codec::{self, Operation, ERR_UNKNOWN_OPERATION, RESEND_ERROR};
use crate::dispatcher;
use crate::state::ProxyState;

/// Drive one accepted connection to completion: read header lines,
/// dispatch each to the appropriate handler, reply, and repeat until the
/// peer disconnects or `REGISTER` closes the session.
pub async fn handle(state: ProxyState, stream: TcpStream, peer: SocketAddr) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let writer: Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>> = Arc::new(Mutex::new(write_half));

    // Populated the first time this session synthesizes an address for
    // `U`, so the cleanup path below knows what to remove and announce.
    let mut registered_address: Option<String> = None;

    loop {
        let mut header_line = String::new();
        match reader.read_line(&mut header_line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%peer, error = %e, "session read error");
                break;
            }
        }
        let header = header_line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            continue;
        }

        let op = Operation::parse(header);
        debug!(%peer, operation = %op, "received operation");

        match op {
            Operation::Register { ip, puerto } => {
                handle_register(&state, &writer, &ip, &puerto).await;
                break;
            }
            Operation::ClientReq { address, .. } => {
                let body = read_body(&mut reader).await;
                let address = resolve_address(&state, &writer, peer, address, &mut registered_address).await;
                let augmented = codec::append_field(header, "ADDRESS", &address);
                let request = format!("{}\n{}", augmented, body);
                let response = dispatcher::forward(&state, &request).await;
                reply(&writer, &format!("OPERACION:RESPUESTA\n{}", response)).await;
            }
            Operation::Message => {
                let body = read_body(&mut reader).await;
                let request = format!("{}\n{}", header, body);
                let response = dispatcher::forward(&state, &request).await;
                reply(&writer, &response).await;
            }
            Operation::SendMessage { address } => {
                let body = read_body(&mut reader).await;
                handle_send_message(&state, &writer, &address, &body).await;
            }
            Operation::Disconnect { .. } => {
                // Only ever synthesized internally (see cleanup below);
                // a client sending this directly is treated as unknown
                // since it carries no externally-meaningful semantics.
                reply(&writer, ERR_UNKNOWN_OPERATION).await;
            }
            Operation::Unknown(_) => {
                reply(&writer, ERR_UNKNOWN_OPERATION).await;
            }
        }
    }

    if let Some(address) = registered_address {
        state.remove_user(&address).await;
        let disconnect = format!("OPERACION:DISCONNECT;ADDRESS:{}\n", address);
        dispatcher::forward(&state, &disconnect).await;
        info!(%peer, %address, "session disconnected, backends notified");
    }
}

async fn handle_register(
    state: &ProxyState,
    writer: &Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    ip: &str,
    puerto: &str,
) {
    match puerto.parse::<u16>() {
        Ok(port) => {
            let backend = Arc::new(TcpBackend::with_tuning(
                ip.to_owned(),
                port,
                state.backend_tuning(),
            ));
            state.register_backend(backend).await;
            info!(backend = %format!("{ip}:{port}"), "backend registered");
            reply(writer, "RESPUESTA:ACK").await;
        }
        Err(_) => {
            warn!(%ip, %puerto, "REGISTER with invalid PUERTO");
            reply(writer, ERR_UNKNOWN_OPERATION).await;
        }
    }
}

async fn handle_send_message(
    state: &ProxyState,
    writer: &Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    address: &str,
    body: &str,
) {
    match state.lookup_user(address).await {
        Some(target) => {
            let mut target = target.lock().await;
            let message = format!("OPERACION:GET_MESSAGE\n{}\n", body);
            if target.write_all(message.as_bytes()).await.is_err() {
                warn!(%address, "failed to push message to connected client");
            }
            drop(target);
            reply(writer, "ACK").await;
        }
        None => {
            reply(writer, RESEND_ERROR).await;
        }
    }
}

/// Resolve the `ADDRESS` to stamp on a forwarded `CLIENT_REQ`: use the
/// header-supplied value if present, otherwise synthesize one from the
/// peer's socket address and register this session in `U`.
///
/// Synthesized addresses concatenate host and port without a separator
/// (e.g. `127.0.0.155123`) per SPEC_FULL.md Open Question 2 — a known,
/// collision-prone format kept for behavioral parity.
async fn resolve_address(
    state: &ProxyState,
    writer: &Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    peer: SocketAddr,
    header_address: String,
    registered_address: &mut Option<String>,
) -> String {
    if !header_address.is_empty() {
        return header_address;
    }
    let address = synthesize_address(peer);
    if state
        .insert_user_if_absent(&address, writer.clone())
        .await
    {
        *registered_address = Some(address.clone());
    }
    address
}

async fn read_body(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut body = String::new();
    match reader.read_line(&mut body).await {
        Ok(0) | Err(_) => String::new(),
        Ok(_) => body.trim_end_matches(['\r', '\n']).to_owned(),
    }
}

async fn reply(writer: &Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>, message: &str) {
    let mut line = message.to_owned();
    line.push('\n');
    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_all(line.as_bytes()).await {
        debug!(error = %e, "failed to write reply");
    }
}
