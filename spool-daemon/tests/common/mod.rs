#![allow(dead_code)]

use anyhow::{Context as _, Result};
use spool_daemon::basic;
use spool_daemon::ipc::IpcServer;
use spool_daemon::registry::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// In-process server on a private socket; aborted on drop
pub struct TestServer {
    temp_dir: TempDir,
    socket_path: PathBuf,
    task: Option<JoinHandle<Result<()>>>,
}

impl TestServer {
    /// Serve the basic project with a fresh temp directory as workdir
    pub async fn start() -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temp directory")?;
        let socket_path = temp_dir.path().join("daemon.sock");
        let workdir = temp_dir.path().join("project");
        std::fs::create_dir_all(&workdir)?;

        let server = IpcServer::new(
            socket_path.clone(),
            Arc::new(basic::registry()?),
            Arc::new(Context::new(&workdir)),
        );
        let task = tokio::spawn(async move { server.run().await });

        // Wait for socket to be created (with timeout)
        let start = std::time::Instant::now();
        while !socket_path.exists() {
            if start.elapsed() > Duration::from_secs(5) {
                task.abort();
                anyhow::bail!("Server failed to create socket within 5s");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Ok(Self {
            temp_dir,
            socket_path,
            task: Some(task),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Project directory the commands see
    pub fn workdir(&self) -> PathBuf {
        self.temp_dir.path().join("project")
    }

    /// Wait for the server task to finish on its own
    pub async fn join(mut self) -> Result<()> {
        let task = self.task.take().context("Server already joined")?;
        timeout(Duration::from_secs(2), task)
            .await
            .context("Timeout waiting for server to stop")??
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Test client for communicating with the server
pub struct TestClient {
    reader: BufReader<tokio::io::ReadHalf<UnixStream>>,
    writer: tokio::io::WriteHalf<UnixStream>,
}

impl TestClient {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = timeout(Duration::from_secs(2), UnixStream::connect(socket_path))
            .await
            .context("Timeout connecting to server")?
            .context("Failed to connect to server")?;

        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send one raw line and read one response line
    pub async fn send_raw(&mut self, line: &str) -> Result<Option<serde_json::Value>> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write request")?;
        self.writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline")?;
        self.writer.flush().await.context("Failed to flush")?;

        let mut response_line = String::new();
        let read = timeout(Duration::from_secs(2), self.reader.read_line(&mut response_line))
            .await
            .context("Timeout reading response")?
            .context("Failed to read response")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(
            serde_json::from_str(&response_line).context("Failed to parse response JSON")?,
        ))
    }

    pub async fn send_request(&mut self, request: serde_json::Value) -> Result<serde_json::Value> {
        self.send_raw(&serde_json::to_string(&request)?)
            .await?
            .context("Connection closed before a response")
    }

    pub async fn ping(&mut self) -> Result<()> {
        let response = self.send_request(serde_json::json!({ "type": "Ping" })).await?;
        if response != serde_json::json!({ "type": "Pong" }) {
            anyhow::bail!("Expected Pong, got: {response:?}");
        }
        Ok(())
    }

    /// Returns the `commands` array
    pub async fn list(&mut self) -> Result<Vec<serde_json::Value>> {
        let response = self
            .send_request(serde_json::json!({ "type": "ListCommands" }))
            .await?;
        let commands = response["payload"]["commands"]
            .as_array()
            .with_context(|| format!("Expected Commands, got: {response:?}"))?;
        Ok(commands.clone())
    }

    /// Returns the whole response so callers can match `Result` or `Error`
    pub async fn invoke(&mut self, path: &[&str], args: serde_json::Value) -> Result<serde_json::Value> {
        self.send_request(serde_json::json!({
            "type": "Invoke",
            "payload": { "path": path, "args": args }
        }))
        .await
    }

    pub async fn shutdown(&mut self) -> Result<serde_json::Value> {
        self.send_request(serde_json::json!({ "type": "Shutdown" })).await
    }
}
