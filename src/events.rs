//! Interaction events and the serialized event sink
//!
//! Every completed session or HTTP request produces exactly one
//! `InteractionEvent`. All handlers emit through a cloneable `EventSink`
//! handle; a single background task drains the channel and writes the
//! formatted records, so one event's lines are never interleaved with
//! another's.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::error;

/// One recorded attacker interaction
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub port: u16,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    /// A single captured payload line (generic ports, HTTP requests)
    Payload(String),
    /// An aggregated FTP session: every command received, plus how long
    /// the peer stayed connected
    Session {
        transcript: Vec<String>,
        duration: Duration,
    },
}

impl InteractionEvent {
    pub fn request(ip: String, port: u16, payload: String) -> Self {
        Self {
            timestamp: Utc::now(),
            ip,
            port,
            kind: EventKind::Payload(payload),
        }
    }

    pub fn session(
        started_at: DateTime<Utc>,
        ip: String,
        port: u16,
        transcript: Vec<String>,
        duration: Duration,
    ) -> Self {
        Self {
            // Session events carry the time the session began; the duration
            // accounts for the rest.
            timestamp: started_at,
            ip,
            port,
            kind: EventKind::Session {
                transcript,
                duration,
            },
        }
    }
}

/// Render an event as its line-oriented console record
pub fn format_event(event: &InteractionEvent) -> String {
    let ts = event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
    match &event.kind {
        EventKind::Payload(payload) => {
            format!(
                "[HTTP/GEN] {} - {}:{} > {}\n",
                ts,
                event.ip,
                event.port,
                payload.trim()
            )
        }
        EventKind::Session {
            transcript,
            duration,
        } => {
            let mut out = format!(
                "[FTP] {} - {}:{} session (duration={:?})\n",
                ts, event.ip, event.port, duration
            );
            for cmd in transcript {
                out.push_str("\t> ");
                out.push_str(cmd);
                out.push('\n');
            }
            out
        }
    }
}

/// Sender handle for emitting events; clone freely into session tasks
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<InteractionEvent>,
}

impl EventSink {
    /// Sink writing records to stdout (the production output stream)
    pub fn stdout() -> Self {
        Self::with_writer(tokio::io::stdout())
    }

    /// Sink writing records to an arbitrary async writer
    pub fn with_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_events(rx, writer));
        Self { tx }
    }

    /// Sink whose events are handed straight to the returned receiver;
    /// used by tests to observe emitted events
    #[cfg(test)]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InteractionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: InteractionEvent) {
        // Only fails if the writer task is gone, i.e. during shutdown
        let _ = self.tx.send(event);
    }
}

/// Background task draining the channel one event at a time
async fn write_events<W>(mut rx: mpsc::UnboundedReceiver<InteractionEvent>, mut writer: W)
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    while let Some(event) = rx.recv().await {
        let record = format_event(&event);
        if let Err(e) = writer.write_all(record.as_bytes()).await {
            error!("Failed to write event record: {}", e);
            break;
        }
        let _ = writer.flush().await;
    }
}
