//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use smtp_intake::config::ServerConfig;
use smtp_intake::lifecycle::Shutdown;
use smtp_intake::server::{ServerError, SmtpServer};
use smtp_intake::smtp::Message;
use smtp_intake::storage::{MessageSink, StorageError};

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub async fn client(&self) -> SmtpClient {
        SmtpClient::connect(self.addr).await
    }

    /// Trigger shutdown and wait for `run` to return.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// Configuration with short timeouts suited to tests.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.smtp.domain = "mx.test".into();
    config.timeouts.command_secs = 5;
    config.timeouts.store_secs = 2;
    config.timeouts.shutdown_secs = 5;
    config
}

pub async fn start_server(config: ServerConfig, sink: Arc<dyn MessageSink>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = SmtpServer::from_listener(config, listener, sink);
    let addr = server.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(shutdown.subscribe()));
    TestServer { addr, shutdown, task }
}

/// Minimal line-oriented SMTP client.
pub struct SmtpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl SmtpClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (r, w) = stream.into_split();
        Self {
            reader: BufReader::new(r),
            writer: w,
        }
    }

    pub async fn write(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
    }

    /// Send one command line and read the reply.
    pub async fn cmd(&mut self, line: &str) -> Vec<String> {
        self.write(format!("{line}\r\n").as_bytes()).await;
        self.reply().await
    }

    pub async fn code(&mut self, line: &str) -> u16 {
        reply_code(&self.cmd(line).await)
    }

    /// Read one (possibly multi-line) reply. Empty when the server closed.
    pub async fn reply(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(Duration::from_secs(10), self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for reply")
                .unwrap_or(0);
            if read == 0 {
                return lines;
            }

            let line = line.trim_end().to_string();
            let more = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line);
            if !more {
                return lines;
            }
        }
    }

    /// Greeting, EHLO, MAIL and RCPT for one recipient.
    pub async fn open_transaction(&mut self, from: &str, to: &str) {
        assert_eq!(reply_code(&self.reply().await), 220);
        assert_eq!(self.code("EHLO client.example").await, 250);
        assert_eq!(self.code(&format!("MAIL FROM:<{from}>")).await, 250);
        assert_eq!(self.code(&format!("RCPT TO:<{to}>")).await, 250);
    }

    /// Send a DATA body (already dot-stuffed, without the terminator).
    pub async fn send_data(&mut self, body: &str) -> Vec<String> {
        assert_eq!(self.code("DATA").await, 354);
        self.write(body.as_bytes()).await;
        self.write(b".\r\n").await;
        self.reply().await
    }

    /// True once the server has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }
}

pub fn reply_code(lines: &[String]) -> u16 {
    lines
        .last()
        .and_then(|line| line.get(..3))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

/// Sink that rejects every message.
pub struct FailingSink;

#[async_trait]
impl MessageSink for FailingSink {
    async fn store(&self, _message: &Message) -> Result<(), StorageError> {
        Err(StorageError::Rejected("backend unavailable".into()))
    }
}

/// Sink that takes `delay` per message before delegating.
pub struct SlowSink<S> {
    pub inner: S,
    pub delay: Duration,
}

#[async_trait]
impl<S: MessageSink> MessageSink for SlowSink<S> {
    async fn store(&self, message: &Message) -> Result<(), StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.store(message).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.inner.close().await
    }
}

/// Poll `check` until it holds or `within` passes.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
