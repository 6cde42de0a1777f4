//! Generic one-shot TCP handler for unclassified ports

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::events::{EventSink, InteractionEvent};

/// A peer gets this long to send its one line
const READ_DEADLINE: Duration = Duration::from_secs(5);

pub async fn start(port: u16, config: Arc<Config>, sink: EventSink) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Cannot bind to {}: {} - abandoning port", addr, e);
            return Ok(());
        }
    };

    info!("Listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((socket, peer_addr)) => {
                let ip = peer_addr.ip().to_string();
                let sink = sink.clone();

                tokio::spawn(async move {
                    handle_connection(socket, ip, port, sink).await;
                });
            }
            Err(e) => {
                warn!("Accept error on port {}: {}", port, e);
            }
        }
    }
}

/// Read at most one line within the deadline; whatever arrived (possibly
/// nothing) becomes the event payload. Emits exactly one event per
/// connection.
async fn handle_connection<S>(socket: S, ip: String, port: u16, sink: EventSink)
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(socket);
    let mut line = String::new();

    // Timeouts and read errors both leave the payload as-is
    let _ = tokio::time::timeout(READ_DEADLINE, reader.read_line(&mut line)).await;

    sink.emit(InteractionEvent::request(ip, port, line));
}
