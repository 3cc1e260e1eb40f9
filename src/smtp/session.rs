//! Per-connection protocol engine.
//!
//! A [`Session`] owns one client stream and drives the state machine one
//! command line at a time. `BDAT` payloads are the exception: they are read
//! as a raw byte count straight from the stream.
//!
//! Every read and write runs under the command timeout. An expired deadline
//! or an I/O failure ends the session without a final reply.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};

use super::command::{parse_bdat, parse_path, Command};
use super::message::Message;
use super::response::Reply;
use super::state::{SessionState, Transaction, TransferMode};
use crate::config::ServerConfig;
use crate::delivery::Delivery;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// Error type ending a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Client idle for {0:?}")]
    Timeout(Duration),

    #[error("Client closed the connection")]
    ClientClosed,
}

enum LineRead {
    Line(Vec<u8>),
    TooLong,
    Eof,
}

/// One SMTP conversation over `S`.
pub struct Session<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    config: Arc<ServerConfig>,
    delivery: Delivery,
    shutdown: ShutdownSignal,
    peer: Option<SocketAddr>,
    state: SessionState,
    helo: Option<String>,
    txn: Transaction,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        config: Arc<ServerConfig>,
        delivery: Delivery,
        shutdown: ShutdownSignal,
        peer: Option<SocketAddr>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            config,
            delivery,
            shutdown,
            peer,
            state: SessionState::Init,
            helo: None,
            txn: Transaction::new(),
        }
    }

    /// Greet the client and process commands until QUIT, shutdown or an
    /// I/O failure.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let mut shutdown = self.shutdown.clone();
        self.send(&Reply::greeting(&self.config.smtp.domain)).await?;

        while self.state != SessionState::Quit {
            let limit = self.config.smtp.max_command_line + 2;
            let read = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::debug!("Shutdown while waiting for command");
                    self.send(&Reply::shutting_down(&self.config.smtp.domain)).await?;
                    return Ok(());
                }
                read = self.read_line(limit) => read?,
            };

            let line = match read {
                LineRead::Line(line) => line,
                LineRead::TooLong => {
                    self.send(&Reply::line_too_long()).await?;
                    continue;
                }
                LineRead::Eof => return Err(SessionError::ClientClosed),
            };

            let line = String::from_utf8_lossy(strip_terminator(&line)).into_owned();
            if line.trim().is_empty() {
                self.send(&Reply::unrecognized()).await?;
                continue;
            }

            let command = Command::parse(&line);
            metrics::record_command(command.name());
            tracing::debug!(command = command.name(), state = ?self.state, "Command received");
            self.dispatch(command).await?;
        }

        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), SessionError> {
        match command {
            Command::Helo(host) => self.hello(host, false).await,
            Command::Ehlo(host) => self.hello(host, true).await,
            Command::Mail(args) => self.mail(&args).await,
            Command::Rcpt(args) => self.rcpt(&args).await,
            Command::Data => self.data().await,
            Command::Bdat(args) => self.bdat(&args).await,
            Command::Rset => {
                self.reset();
                self.send(&Reply::ok()).await
            }
            Command::Noop => self.send(&Reply::ok()).await,
            Command::Quit => {
                self.state = SessionState::Quit;
                self.send(&Reply::goodbye()).await
            }
            Command::Help => {
                let text = "Commands: HELO EHLO MAIL RCPT DATA BDAT RSET NOOP QUIT HELP";
                self.send(&Reply::new(214, text)).await
            }
            Command::Vrfy => {
                let text = "Cannot VRFY user, but will accept message and attempt delivery";
                self.send(&Reply::new(252, text)).await
            }
            Command::Unknown(_) => self.send(&Reply::not_implemented()).await,
        }
    }

    async fn hello(&mut self, host: String, extended: bool) -> Result<(), SessionError> {
        if host.is_empty() {
            let verb = if extended { "EHLO" } else { "HELO" };
            return self.send(&Reply::syntax(format!("Syntax: {verb} hostname"))).await;
        }

        self.reset();
        self.helo = Some(host);

        let domain = self.config.smtp.domain.clone();
        let reply = if extended {
            let mut lines = vec![domain, format!("SIZE {}", self.config.smtp.max_message_size)];
            lines.push("8BITMIME".into());
            if self.config.smtp.enable_chunking {
                lines.push("CHUNKING".into());
            }
            lines.extend(["PIPELINING", "SMTPUTF8", "HELP"].map(String::from));
            Reply::multiline(250, lines)
        } else {
            Reply::new(250, domain)
        };
        self.send(&reply).await
    }

    async fn mail(&mut self, args: &str) -> Result<(), SessionError> {
        if self.state < SessionState::Helo {
            return self.send(&Reply::bad_sequence()).await;
        }

        let path = match parse_path(args, "FROM:") {
            Ok(path) => path,
            Err(e) => return self.send(&Reply::syntax(e.to_string())).await,
        };
        if path
            .declared_size
            .is_some_and(|size| size > self.config.smtp.max_message_size)
        {
            return self.send(&Reply::size_exceeded()).await;
        }

        self.txn.begin(path.address);
        self.state = SessionState::MailFrom;
        self.send(&Reply::ok()).await
    }

    async fn rcpt(&mut self, args: &str) -> Result<(), SessionError> {
        if self.state < SessionState::MailFrom {
            return self.send(&Reply::bad_sequence()).await;
        }

        let has_prefix = args
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("TO:"));
        if !has_prefix {
            return self.send(&Reply::syntax("Syntax: RCPT TO:<address>")).await;
        }
        if self.txn.recipients().len() >= self.config.smtp.max_recipients {
            return self.send(&Reply::too_many_recipients()).await;
        }

        let path = match parse_path(args, "TO:") {
            Ok(path) => path,
            Err(e) => return self.send(&Reply::syntax(e.to_string())).await,
        };

        self.txn.add_recipient(path.address);
        self.state = SessionState::RcptTo;
        self.send(&Reply::ok()).await
    }

    async fn data(&mut self) -> Result<(), SessionError> {
        if self.state < SessionState::RcptTo || self.txn.mode() == Some(TransferMode::Chunked) {
            return self.send(&Reply::bad_sequence()).await;
        }

        self.txn.start_transfer(TransferMode::Data);
        self.state = SessionState::Data;
        self.send(&Reply::start_mail_input()).await?;

        let max = self.config.smtp.max_message_size;
        loop {
            // Room for the remaining budget plus CRLF, and one byte to spot overflow.
            let limit = max.saturating_sub(self.txn.content_len()) + 3;
            let line = match self.read_line(limit).await? {
                LineRead::Line(line) => line,
                LineRead::TooLong => return self.oversize().await,
                LineRead::Eof => return Err(SessionError::ClientClosed),
            };

            let line = strip_terminator(&line);
            if line == b"." {
                return self.finalize().await;
            }
            let line = line.strip_prefix(b".").filter(|rest| rest.starts_with(b".")).unwrap_or(line);

            if self.txn.append_line(line, max).is_err() {
                return self.oversize().await;
            }
        }
    }

    async fn bdat(&mut self, args: &str) -> Result<(), SessionError> {
        if !self.config.smtp.enable_chunking {
            return self.send(&Reply::not_implemented()).await;
        }
        if self.state < SessionState::RcptTo {
            return self.send(&Reply::bad_sequence()).await;
        }

        let chunk = match parse_bdat(args) {
            Ok(chunk) => chunk,
            Err(e) => return self.send(&Reply::syntax(e.to_string())).await,
        };

        self.txn.start_transfer(TransferMode::Chunked);
        if self.txn.content_len().saturating_add(chunk.size) > self.config.smtp.max_message_size {
            self.discard_bytes(chunk.size).await?;
            return self.oversize().await;
        }

        let deadline = self.config.timeouts.command();
        let read = {
            let buf = self.txn.reserve_chunk(chunk.size);
            with_deadline(deadline, self.reader.read_exact(buf)).await
        };
        match read {
            Ok(_) => {}
            Err(SessionError::Io(e)) => {
                tracing::warn!(error = %e, size = chunk.size, "BDAT chunk read failed");
                self.reset();
                let _ = self.send(&Reply::transaction_failed()).await;
                return Err(SessionError::Io(e));
            }
            Err(e) => {
                self.reset();
                return Err(e);
            }
        }

        if chunk.last {
            self.finalize().await
        } else {
            self.send(&Reply::ok()).await
        }
    }

    /// Build the message and hand it off. The session returns to `Helo`
    /// whatever the outcome.
    async fn finalize(&mut self) -> Result<(), SessionError> {
        let (sender, recipients, raw) = self.txn.take();
        self.state = SessionState::Helo;

        let message = Message::from_parts(sender, recipients, raw).with_client(self.helo.clone(), self.peer);
        let size = message.size;
        let sender = message.sender.clone();
        let recipients = message.recipients.len();

        match self.delivery.submit(message).await {
            Ok(()) => {
                metrics::record_message("accepted", size);
                tracing::info!(%sender, recipients, size, "Message accepted");
                self.send(&Reply::message_accepted()).await
            }
            Err(e) => {
                metrics::record_message("failed", size);
                tracing::error!(%sender, recipients, size, error = %e, "Message hand-off failed");
                self.send(&Reply::transaction_failed()).await
            }
        }
    }

    async fn oversize(&mut self) -> Result<(), SessionError> {
        metrics::record_message("oversize", 0);
        tracing::warn!(limit = self.config.smtp.max_message_size, "Message too large");
        self.reset();
        self.send(&Reply::size_exceeded()).await
    }

    fn reset(&mut self) {
        self.txn.clear();
        self.state = SessionState::Helo;
    }

    async fn send(&mut self, reply: &Reply) -> Result<(), SessionError> {
        let deadline = self.config.timeouts.command();
        let wire = reply.to_wire();
        with_deadline(deadline, self.writer.write_all(wire.as_bytes())).await?;
        with_deadline(deadline, self.writer.flush()).await
    }

    /// Read one line of at most `limit` bytes including its terminator.
    /// A longer line is consumed up to its end and reported as `TooLong`.
    async fn read_line(&mut self, limit: usize) -> Result<LineRead, SessionError> {
        let deadline = self.config.timeouts.command();
        let mut buf = Vec::new();
        let n = with_deadline(
            deadline,
            (&mut self.reader).take(limit as u64).read_until(b'\n', &mut buf),
        )
        .await?;

        if n == 0 {
            return Ok(LineRead::Eof);
        }
        if buf.last() == Some(&b'\n') {
            return Ok(LineRead::Line(buf));
        }
        if n >= limit {
            self.discard_line().await?;
            return Ok(LineRead::TooLong);
        }
        Ok(LineRead::Eof)
    }

    async fn discard_line(&mut self) -> Result<(), SessionError> {
        let deadline = self.config.timeouts.command();
        loop {
            let (consumed, done) = {
                let buf = with_deadline(deadline, self.reader.fill_buf()).await?;
                if buf.is_empty() {
                    return Err(SessionError::ClientClosed);
                }
                match buf.iter().position(|&b| b == b'\n') {
                    Some(pos) => (pos + 1, true),
                    None => (buf.len(), false),
                }
            };
            self.reader.consume(consumed);
            if done {
                return Ok(());
            }
        }
    }

    async fn discard_bytes(&mut self, len: usize) -> Result<(), SessionError> {
        let deadline = self.config.timeouts.command();
        let mut chunk = (&mut self.reader).take(len as u64);
        let copied = with_deadline(deadline, tokio::io::copy(&mut chunk, &mut tokio::io::sink())).await?;
        if copied < len as u64 {
            return Err(SessionError::ClientClosed);
        }
        Ok(())
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, SessionError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(SessionError::Timeout(deadline)),
    }
}
