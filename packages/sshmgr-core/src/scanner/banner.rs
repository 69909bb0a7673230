//! TCP banner grab

use super::ProbeOutcome;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Upper bound on banner bytes kept
const BANNER_BUF: usize = 1024;

/// Port swept by subnet scans, independent of any configured host port
const SCAN_PORT: u16 = 22;

/// Grab the ssh greeting from `ip` on port 22.
pub async fn ssh_banner(ip: &str, timeout: Duration) -> ProbeOutcome {
    read_banner(ip, SCAN_PORT, timeout).await
}

/// Connect to `host:port` and read whatever the service sends first.
///
/// Connecting and reading are each bounded by `timeout`. An immediate EOF
/// counts as a failure.
pub async fn read_banner(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    let start = Instant::now();
    let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

    let mut stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::trace!("Banner connect to {}:{} failed: {}", host, port, e);
            return ProbeOutcome::failure(elapsed(start), e.to_string(), Some(e.kind()));
        }
        Err(_) => {
            return ProbeOutcome::failure(
                elapsed(start),
                "connect timed out",
                Some(std::io::ErrorKind::TimedOut),
            );
        }
    };

    let mut buf = vec![0u8; BANNER_BUF];
    match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(0)) => ProbeOutcome::failure(
            elapsed(start),
            "connection closed before banner",
            Some(std::io::ErrorKind::UnexpectedEof),
        ),
        Ok(Ok(n)) => {
            ProbeOutcome::success(elapsed(start), String::from_utf8_lossy(&buf[..n]).into_owned())
        }
        Ok(Err(e)) => ProbeOutcome::failure(elapsed(start), e.to_string(), Some(e.kind())),
        Err(_) => ProbeOutcome::failure(
            elapsed(start),
            "banner read timed out",
            Some(std::io::ErrorKind::TimedOut),
        ),
    }
}

/// Pick the first `*.local` token out of a banner.
pub fn extract_hostname(banner: &str) -> Option<String> {
    banner
        .split_whitespace()
        .find(|field| field.ends_with(".local"))
        .map(str::to_string)
}
