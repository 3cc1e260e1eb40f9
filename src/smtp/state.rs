//! Session state and the per-transaction buffer.
//!
//! # State Transitions
//! ```text
//! Init → Helo → MailFrom → RcptTo → Data
//!          ↑________________________|   (message finished, overflow, RSET)
//! any → Quit
//! ```
//!
//! States are ordered; a command needing a minimum state compares against it.

/// Protocol state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Init,
    Helo,
    MailFrom,
    RcptTo,
    Data,
    Quit,
}

/// How message content is arriving in the current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Data,
    Chunked,
}

/// Appending would pass the configured message size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("message size {size} exceeds limit {limit}")]
pub struct Overflow {
    pub size: usize,
    pub limit: usize,
}

/// Envelope and content accumulated for one mail transaction.
#[derive(Debug, Default)]
pub struct Transaction {
    sender: Option<String>,
    recipients: Vec<String>,
    content: Vec<u8>,
    mode: Option<TransferMode>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything from the current transaction.
    pub fn clear(&mut self) {
        self.sender = None;
        self.recipients.clear();
        self.content.clear();
        self.mode = None;
    }

    /// Start a new transaction for `sender`.
    pub fn begin(&mut self, sender: String) {
        self.clear();
        self.sender = Some(sender);
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn add_recipient(&mut self, recipient: String) {
        self.recipients.push(recipient);
    }

    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    pub fn mode(&self) -> Option<TransferMode> {
        self.mode
    }

    /// Enter a transfer mode, discarding any content from before.
    pub fn start_transfer(&mut self, mode: TransferMode) {
        if self.mode != Some(mode) {
            self.content.clear();
        }
        self.mode = Some(mode);
    }

    /// Append bytes, then check the size limit. On overflow the content is
    /// discarded.
    pub fn append(&mut self, bytes: &[u8], limit: usize) -> Result<(), Overflow> {
        self.content.extend_from_slice(bytes);
        self.check_size(limit)
    }

    /// Append one DATA line, re-terminated with CRLF.
    pub fn append_line(&mut self, line: &[u8], limit: usize) -> Result<(), Overflow> {
        self.content.extend_from_slice(line);
        self.content.extend_from_slice(b"\r\n");
        self.check_size(limit)
    }

    /// Mutable tail of `len` zeroed bytes for reading a chunk in place.
    pub fn reserve_chunk(&mut self, len: usize) -> &mut [u8] {
        let start = self.content.len();
        self.content.resize(start + len, 0);
        &mut self.content[start..]
    }

    /// Hand over the envelope and content, leaving the transaction empty.
    pub fn take(&mut self) -> (String, Vec<String>, Vec<u8>) {
        let sender = self.sender.take().unwrap_or_default();
        let recipients = std::mem::take(&mut self.recipients);
        let content = std::mem::take(&mut self.content);
        self.mode = None;
        (sender, recipients, content)
    }

    fn check_size(&mut self, limit: usize) -> Result<(), Overflow> {
        let size = self.content.len();
        if size > limit {
            self.content.clear();
            return Err(Overflow { size, limit });
        }
        Ok(())
    }
}
