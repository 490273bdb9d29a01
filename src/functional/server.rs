//! Dev-server lifecycle for the functional stage: free-port scan, spawn,
//! readiness poll, and teardown that outlives a hung `npm start`.

use crate::toolchain::{PackageManager, Toolchain};
use anyhow::{Result, bail};
use std::path::Path;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, info, warn};

const PORT_SCAN_RANGE: u16 = 100;
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const GRACEFUL_STOP_WAIT: Duration = Duration::from_secs(5);

/// Markers that distinguish a served React app from an arbitrary page.
/// Matched case-insensitively; at least two must appear.
pub const REACT_INDICATORS: &[&str] = &[
    "react",
    "div id=\"root\"",
    "div id=\"app\"",
    "react-dom",
    "bundle.js",
    "main.js",
];

pub fn react_indicator_count(html: &str) -> usize {
    let lowered = html.to_lowercase();
    REACT_INDICATORS
        .iter()
        .filter(|ind| lowered.contains(*ind))
        .count()
}

/// Scan upward from `base` for a port nothing is bound to. Falls back to
/// `base` if the whole range is busy; the spawn will then fail loudly.
pub fn find_free_port(base: u16) -> u16 {
    for port in base..base.saturating_add(PORT_SCAN_RANGE) {
        if std::net::TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return port;
        }
    }
    base
}

/// Poll `url` until it answers HTTP 200 or the deadline passes.
pub async fn wait_for_http_ok(client: &reqwest::Client, url: &str, deadline: Duration) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    false
}

/// A running student dev server. Dropping it kills the child; prefer
/// [`DevServer::stop`] for a graceful TERM first.
pub struct DevServer {
    child: Child,
    url: String,
    port: u16,
}

impl DevServer {
    /// Spawn the dev server and wait until it serves HTTP 200.
    ///
    /// Fails if the process dies during startup or never becomes ready
    /// within `ready_timeout`; the child is reaped either way.
    pub async fn start(
        toolchain: &Toolchain,
        workspace: &Path,
        pm: PackageManager,
        base_port: u16,
        ready_timeout: Duration,
        client: &reqwest::Client,
    ) -> Result<Self> {
        let port = find_free_port(base_port);
        let url = format!("http://localhost:{port}");
        info!(%url, manager = %pm, "starting dev server");

        let mut child = toolchain.start_command(workspace, pm, port).spawn()?;

        let started = tokio::time::Instant::now();
        while started.elapsed() < ready_timeout {
            if let Some(status) = child.try_wait()? {
                bail!("Dev server exited during startup with {status}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    debug!(%url, elapsed_ms = started.elapsed().as_millis() as u64, "dev server ready");
                    return Ok(Self { child, url, port });
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let _ = child.kill().await;
        bail!(
            "Dev server did not become ready within {} seconds",
            ready_timeout.as_secs()
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Graceful stop: TERM, bounded wait, then KILL.
    pub async fn stop(mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            let _ = tokio::process::Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status()
                .await;
            if tokio::time::timeout(GRACEFUL_STOP_WAIT, self.child.wait())
                .await
                .is_ok()
            {
                debug!(port = self.port, "dev server stopped gracefully");
                return;
            }
            warn!(port = self.port, "dev server ignored TERM, killing");
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn test_react_indicator_count() {
        let cra = r#"<html><body><div id="root"></div><script src="/static/js/bundle.js"></script></body></html>"#;
        assert!(react_indicator_count(cra) >= 2);

        let plain = "<html><body><h1>hello</h1></body></html>";
        assert!(react_indicator_count(plain) < 2);

        // Case-insensitive
        let upper = r#"<DIV ID="ROOT"></DIV> loaded by REACT-DOM"#;
        assert!(react_indicator_count(upper) >= 2);
    }

    #[test]
    fn test_find_free_port_skips_bound_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = listener.local_addr().unwrap().port();
        let free = find_free_port(taken);
        assert_ne!(free, taken);
        assert!(free > taken);
    }

    fn serve_one_200() -> (std::thread::JoinHandle<()>, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let body = "<div id=\"root\"></div>";
                let _ = write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
            }
        });
        (handle, port)
    }

    #[tokio::test]
    async fn test_wait_for_http_ok_succeeds_against_live_listener() {
        let (handle, port) = serve_one_200();
        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{port}");
        assert!(wait_for_http_ok(&client, &url, Duration::from_secs(10)).await);
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_http_ok_times_out_on_dead_port() {
        // Bind then drop so the port is (very likely) unbound.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{port}");
        assert!(!wait_for_http_ok(&client, &url, Duration::from_millis(1200)).await);
    }
}
