//! FTP honeypot handler
//!
//! Listens behind the upstream stream proxy, so every accept goes through
//! the PROXY protocol unwrapper before the session starts.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::events::{EventSink, InteractionEvent};
use crate::proxy::ProxyListener;

pub async fn start(port: u16, config: Arc<Config>, sink: EventSink) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Cannot bind FTP to {}: {} - abandoning port", addr, e);
            return Ok(());
        }
    };
    let listener = ProxyListener::new(listener);

    info!("FTP honeypot listening on port {} (PROXY protocol enabled)", port);
    let banner = config.emulation.ftp_banner.clone();

    loop {
        match listener.accept().await {
            Ok((socket, source)) => {
                let ip = source.ip().to_string();
                let banner = banner.clone();
                let sink = sink.clone();

                tokio::spawn(async move {
                    handle_session(socket, ip, port, banner, sink).await;
                });
            }
            Err(e) => {
                warn!("FTP accept error on port {}: {}", port, e);
            }
        }
    }
}

/// Run one FTP session: banner, then a command/response loop until the peer
/// quits or disconnects. Emits a single aggregate event carrying the full
/// transcript and the session duration.
///
/// No read deadline is imposed; a peer that neither writes nor disconnects
/// holds its session task open indefinitely.
async fn handle_session<S>(stream: S, ip: String, port: u16, banner: String, sink: EventSink)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started_at = Utc::now();
    let start = Instant::now();

    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut transcript = Vec::new();

    let _ = writer.write_all(format!("{}\r\n", banner).as_bytes()).await;

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let cmd = line.trim().to_string();
                transcript.push(cmd.clone());

                if cmd.eq_ignore_ascii_case("QUIT") {
                    let _ = writer.write_all(b"221 Goodbye.\r\n").await;
                    break;
                }
                let _ = writer.write_all(b"500 Unknown command.\r\n").await;
            }
        }
    }

    sink.emit(InteractionEvent::session(
        started_at,
        ip,
        port,
        transcript,
        start.elapsed(),
    ));
}
