use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, error};

use super::types::Command;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClamAVConnection {
    Unix { path: String },
    Tcp { host: String, port: u16 },
}

impl std::fmt::Display for ClamAVConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClamAVConnection::Unix { path } => write!(f, "unix:{}", path),
            ClamAVConnection::Tcp { host, port } => write!(f, "tcp:{}:{}", host, port),
        }
    }
}

/// One command per connection: dial, write, read until the daemon hangs up.
#[async_trait]
pub trait DaemonClient: Send + Sync {
    async fn send(&self, command: Command) -> Result<Vec<u8>>;
}

pub struct ClamAVClientImpl {
    connection: ClamAVConnection,
    timeout: Duration,
}

impl ClamAVClientImpl {
    pub fn new(connection: ClamAVConnection) -> Self {
        Self {
            connection,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connection(&self) -> &ClamAVConnection {
        &self.connection
    }

    async fn send_command(&self, command: Command) -> Result<Vec<u8>> {
        match &self.connection {
            #[cfg(unix)]
            ClamAVConnection::Unix { path } => {
                let stream = timeout(self.timeout, UnixStream::connect(path))
                    .await
                    .map_err(|_| Error::Timeout(format!("Connection to {} timed out", path)))?
                    .map_err(|e| {
                        Error::Connection(format!("Failed to connect to {}: {}", path, e))
                    })?;
                self.exchange(stream, command).await
            }
            #[cfg(not(unix))]
            ClamAVConnection::Unix { .. } => Err(Error::Connection(
                "Unix sockets not supported on this platform".to_string(),
            )),
            ClamAVConnection::Tcp { host, port } => {
                let addr = format!("{}:{}", host, port);
                let stream = timeout(self.timeout, TcpStream::connect(&addr))
                    .await
                    .map_err(|_| Error::Timeout(format!("Connection to {} timed out", addr)))?
                    .map_err(|e| {
                        Error::Connection(format!("Failed to connect to {}: {}", addr, e))
                    })?;
                self.exchange(stream, command).await
            }
        }
    }

    async fn exchange<S>(&self, mut stream: S, command: Command) -> Result<Vec<u8>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!("Sending command to ClamAV: {}", command);

        stream.write_all(command.as_bytes()).await?;

        let mut response = Vec::new();
        timeout(self.timeout, stream.read_to_end(&mut response))
            .await
            .map_err(|_| Error::Timeout(format!("Reading {} response timed out", command)))??;

        if response.is_empty() {
            return Err(Error::ClamAV(format!("Empty response to {}", command)));
        }

        debug!("ClamAV answered {} with {} bytes", command, response.len());
        Ok(response)
    }
}

#[async_trait]
impl DaemonClient for ClamAVClientImpl {
    async fn send(&self, command: Command) -> Result<Vec<u8>> {
        self.send_command(command).await.map_err(|e| {
            error!("Error talking to ClamAV for command {}: {}", command, e);
            e
        })
    }
}
