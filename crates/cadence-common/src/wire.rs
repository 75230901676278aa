// Length-prefixed JSON framing shared by the daemon server and the
// control client: [4 bytes big-endian length][JSON payload]
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Read one length-prefixed JSON message from the stream
pub async fn read_message<S, T>(stream: &mut S) -> Result<T>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        anyhow::bail!(
            "Message size {} exceeds maximum allowed size of {}",
            len,
            MAX_FRAME_SIZE
        );
    }

    if len == 0 {
        anyhow::bail!("Received empty message");
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .context("Failed to read message payload")?;

    let message = serde_json::from_slice(&buf).context("Failed to parse message JSON")?;

    Ok(message)
}

/// Write one length-prefixed JSON message to the stream
pub async fn write_message<S, T>(stream: &mut S, message: &T) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let json_bytes = serde_json::to_vec(message).context("Failed to serialize message")?;

    if json_bytes.len() > MAX_FRAME_SIZE {
        anyhow::bail!(
            "Message size {} exceeds maximum allowed size of {}",
            json_bytes.len(),
            MAX_FRAME_SIZE
        );
    }

    let len = json_bytes.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .context("Failed to write message length")?;

    stream
        .write_all(&json_bytes)
        .await
        .context("Failed to write message payload")?;

    stream.flush().await.context("Failed to flush message")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, Response};
    use tokio::io::duplex;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task;

    #[tokio::test]
    async fn test_round_trip_over_duplex() {
        let (mut a, mut b) = duplex(1024);

        let request = Request::ReloadJobs { dry_run: true };
        write_message(&mut a, &request).await.unwrap();

        let received: Request = read_message(&mut b).await.unwrap();
        match received {
            Request::ReloadJobs { dry_run } => assert!(dry_run),
            _ => panic!("Expected ReloadJobs request"),
        }
    }

    #[tokio::test]
    async fn test_round_trip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_handle = task::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request: Request = read_message(&mut stream).await.unwrap();
            match request {
                Request::Version => {
                    let response = Response::Success {
                        data: serde_json::json!({"version": "0.1.0"}),
                    };
                    write_message(&mut stream, &response).await.unwrap();
                }
                _ => panic!("Unexpected request"),
            }
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_message(&mut stream, &Request::Version).await.unwrap();
        let response: Response = read_message(&mut stream).await.unwrap();
        match response {
            Response::Success { data } => assert_eq!(data["version"], "0.1.0"),
            _ => panic!("Expected Success response"),
        }

        server_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_rejected() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&0u32.to_be_bytes()).await.unwrap();

        let result: Result<Request> = read_message(&mut b).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut a, mut b) = duplex(64);
        let len = (MAX_FRAME_SIZE as u32) + 1;
        a.write_all(&len.to_be_bytes()).await.unwrap();

        let result: Result<Request> = read_message(&mut b).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("maximum"));
    }
}
