// Remote control client: one TCP connection per operation, no retained
// state between calls, no retries.
use cadence_common::wire::{read_message, write_message};
use cadence_common::{ApiError, ClientError, JobChangeResult, Request, Response, VersionInfo};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A transient session against one daemon address
pub struct ClientSession {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ClientSession {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One request/response round trip, bounded by the session timeout.
    ///
    /// Connection failures, premature hangups, and timeouts become
    /// `Transport`; a well-formed rejection from the daemon becomes `Api`.
    async fn call(&self, request: Request) -> Result<serde_json::Value, ClientError> {
        let round_trip = async {
            let mut stream = TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(|e| {
                    ClientError::Transport(format!("{}:{}: {}", self.host, self.port, e))
                })?;
            write_message(&mut stream, &request)
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            let response: Response = read_message(&mut stream)
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            Ok::<_, ClientError>(response)
        };

        let response = timeout(self.timeout, round_trip).await.map_err(|_| {
            ClientError::Transport(format!(
                "{}:{}: request timed out after {:?}",
                self.host, self.port, self.timeout
            ))
        })??;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { code, message } => Err(ClientError::Api(ApiError::new(code, message))),
        }
    }

    /// Ask the daemon for its version string
    pub async fn version(&self) -> Result<String, ClientError> {
        let data = self.call(Request::Version).await?;
        let info: VersionInfo = serde_json::from_value(data)
            .map_err(|e| ClientError::Transport(format!("malformed version response: {}", e)))?;
        Ok(info.version)
    }

    /// Ask the daemon to diff (and unless dry-run, apply) job source changes
    pub async fn reload_jobs(&self, dry_run: bool) -> Result<JobChangeResult, ClientError> {
        let data = self.call(Request::ReloadJobs { dry_run }).await?;
        serde_json::from_value(data)
            .map_err(|e| ClientError::Transport(format!("malformed reload response: {}", e)))
    }

    /// Ask the daemon to terminate; with `restart`, to relaunch afterwards
    pub async fn shut_down(&self, restart: bool) -> Result<(), ClientError> {
        self.call(Request::Shutdown { restart }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn unused_port() -> u16 {
        // Bind then drop so the port is closed when the client connects.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_a_transport_error() {
        let port = unused_port().await;
        let session = ClientSession::new("127.0.0.1", port);

        match session.version().await {
            Err(ClientError::Transport(msg)) => {
                assert!(msg.contains("127.0.0.1"), "message names the address: {}", msg);
            }
            other => panic!("Expected Transport error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_premature_hangup_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Accept and hang up without replying.
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let session = ClientSession::new("127.0.0.1", addr.port());
        match session.version().await {
            Err(ClientError::Transport(_)) => {}
            other => panic!("Expected Transport error, got {:?}", other.map(|_| ())),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_daemon_rejection_is_an_api_error() {
        use cadence_common::wire::{read_message, write_message};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _request: Request = read_message(&mut stream).await.unwrap();
            let response = Response::Error {
                code: 409,
                message: "reload already in progress".to_string(),
            };
            write_message(&mut stream, &response).await.unwrap();
        });

        let session = ClientSession::new("127.0.0.1", addr.port());
        match session.reload_jobs(false).await {
            Err(ClientError::Api(err)) => {
                assert_eq!(err.code, 409);
                assert_eq!(err.message, "reload already in progress");
            }
            other => panic!("Expected Api error, got {:?}", other.map(|_| ())),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_daemon_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Accept but never reply.
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let session =
            ClientSession::new("127.0.0.1", addr.port()).with_timeout(Duration::from_millis(50));
        match session.version().await {
            Err(ClientError::Transport(msg)) => assert!(msg.contains("timed out")),
            other => panic!("Expected Transport error, got {:?}", other.map(|_| ())),
        }
        server.abort();
    }
}
