// src/core/probe/port.rs

use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{PortOutcome, PortProbeOptions, PortProber};
use crate::core::knowledge_base::{self, BannerGrammar};
use crate::core::models::PortState;

const BANNER_BUFFER: usize = 1024;

/// TCP connect probe with optional banner capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPortProber;

#[async_trait]
impl PortProber for TcpPortProber {
    async fn probe(&self, host: &str, port: u16, options: PortProbeOptions) -> PortOutcome {
        let service = knowledge_base::service_for_port(port);

        let state = match timeout(options.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                let banner = match (options.read_banner, service.and_then(knowledge_base::banner_grammar)) {
                    (true, Some(grammar)) => read_banner(stream, host, grammar, options.timeout).await,
                    _ => None,
                };
                return PortOutcome {
                    state: PortState::Open,
                    service: service.map(str::to_string),
                    banner,
                };
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => PortState::Closed,
            Ok(Err(e)) => {
                debug!(host, port, error = %e, "Connect failed, classifying as filtered.");
                PortState::Filtered
            }
            Err(_) => PortState::Filtered,
        };

        PortOutcome { state, service: service.map(str::to_string), banner: None }
    }
}

async fn read_banner(mut stream: TcpStream, host: &str, grammar: BannerGrammar, limit: Duration) -> Option<String> {
    if grammar == BannerGrammar::HttpHead {
        let request = format!("HEAD / HTTP/1.0\r\nHost: {}\r\n\r\n", host);
        timeout(limit, stream.write_all(request.as_bytes())).await.ok()?.ok()?;
    }

    let mut buf = vec![0u8; BANNER_BUFFER];
    let n = timeout(limit, stream.read(&mut buf)).await.ok()?.ok()?;
    parse_banner(&String::from_utf8_lossy(&buf[..n]), grammar)
}

/// Extracts the banner from raw bytes read off a socket.
pub fn parse_banner(raw: &str, grammar: BannerGrammar) -> Option<String> {
    let banner = match grammar {
        BannerGrammar::Greeting => raw.lines().next().map(str::trim),
        BannerGrammar::HttpHead => raw
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim().eq_ignore_ascii_case("server").then(|| value.trim())
            })
            .or_else(|| raw.lines().next().map(str::trim)),
    };
    banner.filter(|b| !b.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_greeting_banner() {
        let raw = "SSH-2.0-OpenSSH_9.6\r\nmore";
        assert_eq!(parse_banner(raw, BannerGrammar::Greeting).as_deref(), Some("SSH-2.0-OpenSSH_9.6"));
        assert_eq!(parse_banner("", BannerGrammar::Greeting), None);
    }

    #[test]
    fn test_parse_http_banner() {
        let raw = "HTTP/1.1 200 OK\r\nDate: x\r\nServer: nginx/1.25.3\r\n\r\n";
        assert_eq!(parse_banner(raw, BannerGrammar::HttpHead).as_deref(), Some("nginx/1.25.3"));
        let raw = "HTTP/1.0 400 Bad Request\r\n\r\n";
        assert_eq!(parse_banner(raw, BannerGrammar::HttpHead).as_deref(), Some("HTTP/1.0 400 Bad Request"));
    }

    #[tokio::test]
    async fn test_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        let options = PortProbeOptions { timeout: Duration::from_millis(500), read_banner: false };

        let outcome = TcpPortProber.probe("127.0.0.1", open_port, options).await;
        assert_eq!(outcome.state, PortState::Open);

        drop(listener);
        let outcome = TcpPortProber.probe("127.0.0.1", open_port, options).await;
        assert_ne!(outcome.state, PortState::Open);
    }

    #[tokio::test]
    async fn test_unresolvable_host_does_not_fail() {
        let options = PortProbeOptions { timeout: Duration::from_millis(300), read_banner: true };
        let outcome = TcpPortProber.probe("host.invalid", 22, options).await;
        assert_eq!(outcome.state, PortState::Filtered);
        assert_eq!(outcome.service.as_deref(), Some("ssh"));
        assert!(outcome.banner.is_none());
    }
}
