//! Completed messages and header extraction.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use mailparse::MailHeaderMap;

/// A finished mail transaction, handed to storage unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    /// Content after the header block, or everything when there is none.
    pub body: String,
    /// Every byte received for the message.
    pub raw: Vec<u8>,
    pub size: usize,
    pub received_at: DateTime<Utc>,
    /// Hostname the client gave in HELO/EHLO.
    pub helo: Option<String>,
    pub peer: Option<SocketAddr>,
}

impl Message {
    /// Build a message from envelope and raw content, deriving subject and body.
    pub fn from_parts(sender: impl Into<String>, recipients: Vec<String>, raw: Vec<u8>) -> Self {
        let subject = extract_subject(&raw).unwrap_or_default();
        let body = match split_header_block(&raw) {
            Some((_, body)) => String::from_utf8_lossy(body).into_owned(),
            None => String::from_utf8_lossy(&raw).into_owned(),
        };

        Self {
            sender: sender.into(),
            recipients,
            subject,
            body,
            size: raw.len(),
            raw,
            received_at: Utc::now(),
            helo: None,
            peer: None,
        }
    }

    /// Attach what is known about the submitting client.
    pub fn with_client(mut self, helo: Option<String>, peer: Option<SocketAddr>) -> Self {
        self.helo = helo;
        self.peer = peer;
        self
    }
}

/// Split raw content at the first blank line into (headers, body).
pub fn split_header_block(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        return Some((&raw[..pos], &raw[pos + 4..]));
    }
    find(raw, b"\n\n").map(|pos| (&raw[..pos], &raw[pos + 2..]))
}

/// Find the Subject header, first by scanning the header block, then with a
/// full message parse for folded or encoded values.
pub fn extract_subject(raw: &[u8]) -> Option<String> {
    if let Some(subject) = scan_subject(raw) {
        return Some(subject);
    }

    match mailparse::parse_mail(raw) {
        Ok(parsed) => parsed.headers.get_first_value("Subject"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse message headers");
            None
        }
    }
}

fn scan_subject(raw: &[u8]) -> Option<String> {
    let (headers, _) = split_header_block(raw)?;
    let headers = String::from_utf8_lossy(headers);

    let mut lines = headers.lines().peekable();
    while let Some(line) = lines.next() {
        let is_subject = line
            .get(..8)
            .is_some_and(|name| name.eq_ignore_ascii_case("subject:"));
        if !is_subject {
            continue;
        }

        let folded = lines
            .peek()
            .is_some_and(|next| next.starts_with(' ') || next.starts_with('\t'));
        let value = line[8..].trim();
        if folded || value.contains("=?") {
            return None;
        }
        return Some(value.to_string());
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_header_block_at_first_blank_line() {
        let raw = b"Subject: hi\r\nFrom: a\r\n\r\nbody\r\n\r\nmore\r\n";
        let (headers, body) = split_header_block(raw).unwrap();
        assert_eq!(headers, b"Subject: hi\r\nFrom: a");
        assert_eq!(body, b"body\r\n\r\nmore\r\n");
    }

    #[test]
    fn test_subject_is_case_insensitive() {
        assert_eq!(extract_subject(b"SUBJECT:   Hello \r\n\r\nx").as_deref(), Some("Hello"));
        assert_eq!(extract_subject(b"subject: lower\r\n\r\nx").as_deref(), Some("lower"));
    }

    #[test]
    fn test_folded_and_encoded_subjects_use_full_parse() {
        let folded = b"Subject: first\r\n second\r\n\r\nbody";
        assert_eq!(extract_subject(folded).as_deref(), Some("first second"));

        let encoded = b"Subject: =?UTF-8?B?aMOpbGxv?=\r\n\r\nbody";
        assert_eq!(extract_subject(encoded).as_deref(), Some("h\u{e9}llo"));
    }

    #[test]
    fn test_missing_subject_is_empty() {
        let message = Message::from_parts("a@x.com", vec!["b@y.com".into()], b"From: a\r\n\r\nhi\r\n".to_vec());
        assert_eq!(message.subject, "");
        assert_eq!(message.body, "hi\r\n");
    }

    #[test]
    fn test_content_without_headers_is_all_body() {
        let raw = b"just some text\r\n".to_vec();
        let message = Message::from_parts("a@x.com", vec!["b@y.com".into()], raw.clone());
        assert_eq!(message.body, "just some text\r\n");
        assert_eq!(message.size, raw.len());
        assert_eq!(message.raw, raw);
    }

    #[test]
    fn test_attaches_client_details() {
        let peer: SocketAddr = "192.0.2.1:40000".parse().unwrap();
        let message = Message::from_parts("a@x.com", vec![], Vec::new())
            .with_client(Some("client.example".into()), Some(peer));
        assert_eq!(message.helo.as_deref(), Some("client.example"));
        assert_eq!(message.peer, Some(peer));
    }
}
