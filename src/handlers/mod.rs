//! Protocol handlers and the listener dispatcher

pub mod ftp;
pub mod generic;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::events::EventSink;

/// Protocol classification for a listening port; fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ftp,
    Http,
    Generic,
}

/// Map a port to the handler that owns it
pub fn classify(port: u16) -> Protocol {
    match port {
        21 => Protocol::Ftp,
        80 => Protocol::Http,
        _ => Protocol::Generic,
    }
}

/// Start one independent listener task per configured port
pub async fn start_all(config: &Config, sink: EventSink) -> Result<()> {
    let config = Arc::new(config.clone());

    for &port in &config.server.ports {
        let config = config.clone();
        let sink = sink.clone();

        tokio::spawn(async move {
            let result = match classify(port) {
                Protocol::Ftp => ftp::start(port, config, sink).await,
                Protocol::Http => crate::web::start(port, config, sink).await,
                Protocol::Generic => generic::start(port, config, sink).await,
            };
            if let Err(e) = result {
                error!("Handler on port {} failed: {}", port, e);
            }
        });
    }

    info!("Started {} listeners", config.server.ports.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_well_known_ports() {
        assert_eq!(classify(21), Protocol::Ftp);
        assert_eq!(classify(80), Protocol::Http);
    }

    #[test]
    fn classifies_everything_else_as_generic() {
        for port in [22, 23, 443, 2121, 8080, 65535] {
            assert_eq!(classify(port), Protocol::Generic);
        }
    }
}
