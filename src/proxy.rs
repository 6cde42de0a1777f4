//! PROXY protocol v1/v2 listener decoration
//!
//! The FTP port sits behind an upstream stream proxy (nginx `stream` block)
//! that prepends a PROXY protocol header to every forwarded connection.
//! `ProxyListener` wraps a `TcpListener` so that `accept` parses and consumes
//! that header and reports the original client address. Connections without a
//! well-formed header pass through untouched with the socket peer address.
//!
//! The preamble is probed with `TcpStream::peek`, so nothing is consumed
//! until a complete, valid header has been seen.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// v2 binary signature
const V2_SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];
/// v1 text prefix
const V1_PREFIX: &[u8] = b"PROXY ";
/// A v1 line never exceeds 107 bytes including CRLF
const V1_MAX_LEN: usize = 107;
/// Probe buffer: covers a maximal v1 line and the v2 fixed part + addresses
const PROBE_LEN: usize = 128;
/// How long a connection may sit silent before we stop waiting for a header
const PROBE_WINDOW: Duration = Duration::from_secs(3);
/// Re-peek interval while a header prefix is still incomplete
const PROBE_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum PreambleError {
    #[error("stream does not begin with a PROXY protocol preamble")]
    NotProxy,
    #[error("PROXY protocol preamble is incomplete")]
    Incomplete,
    #[error("malformed PROXY protocol header: {0}")]
    Malformed(&'static str),
}

/// A successfully parsed preamble
#[derive(Debug, PartialEq, Eq)]
pub struct Preamble {
    /// Total header bytes to consume from the stream
    pub header_len: usize,
    /// Original client address; `None` for LOCAL/UNKNOWN headers, which
    /// keep the socket peer address
    pub source: Option<SocketAddr>,
}

/// TCP listener that transparently unwraps PROXY protocol preambles
pub struct ProxyListener {
    inner: TcpListener,
}

impl ProxyListener {
    pub fn new(inner: TcpListener) -> Self {
        Self { inner }
    }

    /// Accept a connection, returning the stream with any PROXY header
    /// already consumed, plus the resolved source address.
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        let (mut stream, peer) = self.inner.accept().await?;
        let source = match tokio::time::timeout(PROBE_WINDOW, unwrap_preamble(&mut stream)).await {
            Ok(Ok(Some(addr))) => addr,
            Ok(Ok(None)) => peer,
            Ok(Err(e)) => {
                debug!("PROXY preamble probe failed for {}: {}", peer, e);
                peer
            }
            Err(_) => {
                debug!("No PROXY preamble from {} within probe window", peer);
                peer
            }
        };
        Ok((stream, source))
    }
}

/// Probe the stream head; if a valid preamble is present, consume exactly its
/// bytes and return the embedded source address. Anything else leaves the
/// stream untouched.
async fn unwrap_preamble(stream: &mut TcpStream) -> std::io::Result<Option<SocketAddr>> {
    let mut buf = [0u8; PROBE_LEN];
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            // Peer closed without sending anything
            return Ok(None);
        }
        match parse_preamble(&buf[..n]) {
            Ok(preamble) => {
                discard(stream, preamble.header_len).await?;
                return Ok(preamble.source);
            }
            Err(PreambleError::Incomplete) => {
                if n == buf.len() {
                    // Prefix looked right but no complete header fits the
                    // probe buffer; treat as not proxied
                    return Ok(None);
                }
                tokio::time::sleep(PROBE_INTERVAL).await;
            }
            Err(e) => {
                if !matches!(e, PreambleError::NotProxy) {
                    debug!("Rejected PROXY preamble: {}", e);
                }
                return Ok(None);
            }
        }
    }
}

/// Read and drop exactly `len` already-validated header bytes
async fn discard(stream: &mut TcpStream, mut len: usize) -> std::io::Result<()> {
    let mut scratch = [0u8; 256];
    while len > 0 {
        let take = len.min(scratch.len());
        stream.read_exact(&mut scratch[..take]).await?;
        len -= take;
    }
    Ok(())
}

/// Classify the first bytes of a stream as a v1 line, a v2 block, or not a
/// PROXY preamble at all. Pure over the byte slice; callers re-probe on
/// `Incomplete`.
pub fn parse_preamble(buf: &[u8]) -> Result<Preamble, PreambleError> {
    if buf.is_empty() {
        return Err(PreambleError::Incomplete);
    }
    let sig_len = buf.len().min(V2_SIGNATURE.len());
    if buf[..sig_len] == V2_SIGNATURE[..sig_len] {
        if buf.len() < V2_SIGNATURE.len() {
            return Err(PreambleError::Incomplete);
        }
        return parse_v2(buf);
    }
    let prefix_len = buf.len().min(V1_PREFIX.len());
    if buf[..prefix_len] == V1_PREFIX[..prefix_len] {
        if buf.len() < V1_PREFIX.len() {
            return Err(PreambleError::Incomplete);
        }
        return parse_v1(buf);
    }
    Err(PreambleError::NotProxy)
}

fn parse_v1(buf: &[u8]) -> Result<Preamble, PreambleError> {
    let end = match buf.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => pos,
        None if buf.len() >= V1_MAX_LEN => {
            return Err(PreambleError::Malformed("v1 line exceeds 107 bytes"))
        }
        None => return Err(PreambleError::Incomplete),
    };
    if end + 2 > V1_MAX_LEN {
        return Err(PreambleError::Malformed("v1 line exceeds 107 bytes"));
    }
    let line = std::str::from_utf8(&buf[..end])
        .map_err(|_| PreambleError::Malformed("v1 line is not ASCII"))?;

    let mut fields = line.split(' ');
    fields.next(); // "PROXY", guaranteed by the prefix check
    let family = fields
        .next()
        .ok_or(PreambleError::Malformed("missing v1 address family"))?;

    match family {
        // Proxy could not determine the original address; header is still
        // consumed, socket peer address stands
        "UNKNOWN" => Ok(Preamble {
            header_len: end + 2,
            source: None,
        }),
        "TCP4" | "TCP6" => {
            let src_ip = fields
                .next()
                .ok_or(PreambleError::Malformed("missing source address"))?;
            let _dst_ip = fields
                .next()
                .ok_or(PreambleError::Malformed("missing destination address"))?;
            let src_port = fields
                .next()
                .ok_or(PreambleError::Malformed("missing source port"))?;
            let _dst_port = fields
                .next()
                .ok_or(PreambleError::Malformed("missing destination port"))?;
            if fields.next().is_some() {
                return Err(PreambleError::Malformed("trailing v1 fields"));
            }

            let ip: IpAddr = src_ip
                .parse()
                .map_err(|_| PreambleError::Malformed("unparseable source address"))?;
            match (family, &ip) {
                ("TCP4", IpAddr::V4(_)) | ("TCP6", IpAddr::V6(_)) => {}
                _ => return Err(PreambleError::Malformed("address family mismatch")),
            }
            let port: u16 = src_port
                .parse()
                .map_err(|_| PreambleError::Malformed("unparseable source port"))?;

            Ok(Preamble {
                header_len: end + 2,
                source: Some(SocketAddr::new(ip, port)),
            })
        }
        _ => Err(PreambleError::Malformed("unknown v1 address family")),
    }
}

fn parse_v2(buf: &[u8]) -> Result<Preamble, PreambleError> {
    if buf.len() < 16 {
        return Err(PreambleError::Incomplete);
    }
    let ver_cmd = buf[12];
    if ver_cmd >> 4 != 0x2 {
        return Err(PreambleError::Malformed("unsupported v2 version"));
    }
    let addr_len = u16::from_be_bytes([buf[14], buf[15]]) as usize;
    let header_len = 16 + addr_len;

    match ver_cmd & 0x0F {
        // LOCAL: health check from the proxy itself; consume, keep peer addr
        0x0 => Ok(Preamble {
            header_len,
            source: None,
        }),
        0x1 => {
            let family = buf[13] >> 4;
            match family {
                // AF_INET: src4 + dst4 + src port + dst port
                0x1 => {
                    if addr_len < 12 {
                        return Err(PreambleError::Malformed("v2 INET block too short"));
                    }
                    if buf.len() < 16 + 12 {
                        return Err(PreambleError::Incomplete);
                    }
                    let ip = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);
                    let port = u16::from_be_bytes([buf[24], buf[25]]);
                    Ok(Preamble {
                        header_len,
                        source: Some(SocketAddr::new(IpAddr::V4(ip), port)),
                    })
                }
                // AF_INET6: src16 + dst16 + src port + dst port
                0x2 => {
                    if addr_len < 36 {
                        return Err(PreambleError::Malformed("v2 INET6 block too short"));
                    }
                    if buf.len() < 16 + 36 {
                        return Err(PreambleError::Incomplete);
                    }
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(&buf[16..32]);
                    let ip = Ipv6Addr::from(octets);
                    let port = u16::from_be_bytes([buf[48], buf[49]]);
                    Ok(Preamble {
                        header_len,
                        source: Some(SocketAddr::new(IpAddr::V6(ip), port)),
                    })
                }
                // AF_UNSPEC / AF_UNIX: no usable TCP source address
                0x0 | 0x3 => Ok(Preamble {
                    header_len,
                    source: None,
                }),
                _ => Err(PreambleError::Malformed("unknown v2 address family")),
            }
        }
        _ => Err(PreambleError::Malformed("unknown v2 command")),
    }
}
