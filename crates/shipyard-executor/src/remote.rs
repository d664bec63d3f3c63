//! Agent reached over HTTP.
//!
//! The helper service exposes three JSON endpoints:
//!
//! - `GET /healthz`: 2xx once the agent can take work
//! - `POST /commands`: `{"command": "..."}` → [`CommandOutput`]
//! - `POST /dirs`: a directory spec, 2xx on success
//!
//! Each request opens its own HTTP/1 connection.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use tracing::{debug, info};

use shipyard_core::DirSpec;

use crate::error::{ExecError, ExecResult};
use crate::{Agent, AgentLauncher, BoxFuture, CommandOutput};

#[derive(Debug, Clone)]
pub struct HttpAgent {
    /// `host:port` of the helper service.
    address: String,
    /// Budget for a single request, command runtime included.
    timeout: Duration,
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    command: &'a str,
}

impl HttpAgent {
    pub fn new(address: &str, timeout: Duration) -> Self {
        Self {
            address: normalize_address(address),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ExecResult<(StatusCode, Bytes)> {
        let uri = format!("http://{}{}", self.address, path);
        let address = self.address.clone();

        let exchange = async {
            let stream = tokio::net::TcpStream::connect(&address)
                .await
                .map_err(|e| ExecError::Transport(format!("connect {uri}: {e}")))?;
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| ExecError::Transport(format!("handshake {uri}: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            // The low-level connection writes the URI verbatim, so only
            // the origin-form path goes on the request line.
            let mut builder = http::Request::builder()
                .method(method)
                .uri(path)
                .header(http::header::HOST, &address)
                .header(http::header::USER_AGENT, "shipyard-executor/0.1");
            if body.is_some() {
                builder = builder.header(http::header::CONTENT_TYPE, "application/json");
            }
            let req = builder
                .body(Full::new(Bytes::from(body.unwrap_or_default())))
                .map_err(|e| ExecError::Transport(format!("build request {uri}: {e}")))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| ExecError::Transport(format!("request {uri}: {e}")))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| ExecError::Transport(format!("read body {uri}: {e}")))?
                .to_bytes();
            debug!(%uri, %status, "agent responded");
            Ok::<_, ExecError>((status, bytes))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ExecError::Transport(format!(
                "{uri} timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ExecResult<Bytes> {
        let payload =
            serde_json::to_vec(body).map_err(|e| ExecError::Protocol(e.to_string()))?;
        let (status, bytes) = self.request(Method::POST, path, Some(payload)).await?;
        if !status.is_success() {
            return Err(ExecError::Protocol(format!(
                "POST {path} returned {status}: {}",
                String::from_utf8_lossy(&bytes).trim()
            )));
        }
        Ok(bytes)
    }

    /// One health probe; `Ok(())` only on 2xx.
    pub async fn healthz(&self) -> ExecResult<()> {
        let (status, _) = self.request(Method::GET, "/healthz", None).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(ExecError::Unavailable {
                address: self.address.clone(),
                reason: format!("healthz returned {status}"),
            })
        }
    }
}

fn normalize_address(address: &str) -> String {
    address
        .trim()
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

impl Agent for HttpAgent {
    fn execute<'a>(&'a self, command: &'a str) -> BoxFuture<'a, ExecResult<CommandOutput>> {
        Box::pin(async move {
            let bytes = self.post_json("/commands", &CommandRequest { command }).await?;
            let mut output: CommandOutput = serde_json::from_slice(&bytes)
                .map_err(|e| ExecError::Protocol(format!("command response: {e}")))?;
            output.command = command.to_string();
            Ok(output)
        })
    }

    fn make_dir<'a>(&'a self, dir: &'a DirSpec) -> BoxFuture<'a, ExecResult<()>> {
        Box::pin(async move {
            self.post_json("/dirs", dir).await.map_err(|e| ExecError::Dir {
                path: dir.path.clone(),
                reason: e.to_string(),
            })?;
            Ok(())
        })
    }

    fn shutdown(&self) -> BoxFuture<'_, ExecResult<()>> {
        // The helper's lifecycle belongs to whoever deployed it.
        Box::pin(async move {
            debug!(address = %self.address, "releasing http agent");
            Ok(())
        })
    }
}

/// Connects to an already-running helper and waits for it to be healthy.
#[derive(Debug, Clone)]
pub struct HttpLauncher {
    address: String,
    request_timeout: Duration,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl HttpLauncher {
    pub fn new(address: &str) -> Self {
        Self {
            address: normalize_address(address),
            request_timeout: Duration::from_secs(300),
            ready_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.ready_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }
}

impl AgentLauncher for HttpLauncher {
    fn launch<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ExecResult<Arc<dyn Agent>>> {
        Box::pin(async move {
            let agent = HttpAgent::new(&self.address, self.request_timeout);
            let probe = HttpAgent::new(&self.address, self.poll_interval.max(Duration::from_millis(100)));
            let deadline = tokio::time::Instant::now() + self.ready_timeout;

            loop {
                match probe.healthz().await {
                    Ok(()) => break,
                    Err(e) if tokio::time::Instant::now() >= deadline => {
                        return Err(ExecError::Unavailable {
                            address: self.address.clone(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => {
                        debug!(address = %self.address, error = %e, "agent not healthy yet");
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }

            info!(address = %self.address, %namespace, "http agent ready");
            Ok(Arc::new(agent) as Arc<dyn Agent>)
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve `responses` in order, one connection each, capturing requests.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                seen.push(read_request(&mut sock).await);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(reply.as_bytes()).await.unwrap();
                sock.shutdown().await.unwrap();
            }
            seen
        });
        (address, handle)
    }

    async fn read_request(sock: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length || n == 0 {
                    return text;
                }
            }
            if n == 0 {
                return text;
            }
        }
    }

    #[tokio::test]
    async fn execute_posts_command_and_decodes_output() {
        let (address, server) =
            serve(vec![(200, r#"{"exit_code": 2, "stdout": "", "stderr": "missing"}"#)]).await;
        let agent = HttpAgent::new(&format!("http://{address}/"), Duration::from_secs(5));

        let out = agent.execute("psql -c 'select 1'").await.unwrap();
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.stderr, "missing");
        assert_eq!(out.command, "psql -c 'select 1'");

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /commands"));
        assert!(requests[0].contains(r#"{"command":"psql -c 'select 1'"}"#));
    }

    #[tokio::test]
    async fn make_dir_error_status_surfaces() {
        let (address, server) = serve(vec![(500, r#"{"error": "read-only fs"}"#)]).await;
        let agent = HttpAgent::new(&address, Duration::from_secs(5));
        let dir = DirSpec {
            path: "/data/pg".to_string(),
            mode: None,
            owner: None,
        };
        match agent.make_dir(&dir).await {
            Err(ExecError::Dir { path, reason }) => {
                assert_eq!(path, "/data/pg");
                assert!(reason.contains("read-only fs"));
            }
            other => panic!("expected dir error, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn launcher_waits_for_health() {
        let (address, server) = serve(vec![(503, "{}"), (200, "{}")]).await;
        let launcher = HttpLauncher::new(&address)
            .with_ready_timeout(Duration::from_secs(5), Duration::from_millis(100));
        launcher.launch("ns").await.unwrap();
        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.starts_with("GET /healthz")));
    }

    #[tokio::test]
    async fn launcher_gives_up_on_unreachable_agent() {
        // Bind then drop to get a port nobody listens on.
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let launcher = HttpLauncher::new(&address)
            .with_ready_timeout(Duration::from_millis(300), Duration::from_millis(100));
        assert!(matches!(
            launcher.launch("ns").await,
            Err(ExecError::Unavailable { .. })
        ));
    }

    #[test]
    fn address_normalized() {
        assert_eq!(normalize_address(" http://agent:8080/ "), "agent:8080");
        assert_eq!(normalize_address("10.0.0.5:9000"), "10.0.0.5:9000");
    }
}
