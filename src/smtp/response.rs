//! SMTP replies and their wire format.
//!
//! A reply is a code plus one or more text lines. On the wire every line but
//! the last uses `-` after the code; the last uses a space.

/// A single SMTP reply, possibly multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Multi-line reply. An empty `lines` yields a single line with no text.
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        let lines = if lines.is_empty() { vec![String::new()] } else { lines };
        Self { code, lines }
    }

    /// Render the reply with CRLF line endings.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            out.push_str(&self.code.to_string());
            if i != last {
                out.push('-');
            } else if !line.is_empty() {
                out.push(' ');
            }
            out.push_str(line);
            out.push_str("\r\n");
        }
        out
    }

    pub fn greeting(domain: &str) -> Self {
        Self::new(220, format!("{domain} ESMTP ready"))
    }

    pub fn goodbye() -> Self {
        Self::new(221, "Goodbye")
    }

    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub fn message_accepted() -> Self {
        Self::new(250, "OK: message accepted")
    }

    pub fn start_mail_input() -> Self {
        Self::new(354, "Start mail input; end with <CRLF>.<CRLF>")
    }

    pub fn shutting_down(domain: &str) -> Self {
        Self::new(421, format!("{domain} Service not available, closing transmission channel"))
    }

    pub fn too_many_connections() -> Self {
        Self::new(421, "Too many connections from your IP")
    }

    pub fn too_many_recipients() -> Self {
        Self::new(452, "Too many recipients")
    }

    pub fn line_too_long() -> Self {
        Self::new(500, "Line too long")
    }

    pub fn unrecognized() -> Self {
        Self::new(500, "Syntax error, command unrecognized")
    }

    pub fn syntax(text: impl Into<String>) -> Self {
        Self::new(501, text)
    }

    pub fn not_implemented() -> Self {
        Self::new(502, "Command not implemented")
    }

    pub fn bad_sequence() -> Self {
        Self::new(503, "Bad sequence of commands")
    }

    pub fn size_exceeded() -> Self {
        Self::new(552, "Message size exceeds fixed limit")
    }

    pub fn transaction_failed() -> Self {
        Self::new(554, "Transaction failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_wire_format() {
        assert_eq!(Reply::ok().to_wire(), "250 OK\r\n");
        assert_eq!(Reply::greeting("mx.test").to_wire(), "220 mx.test ESMTP ready\r\n");
    }

    #[test]
    fn test_multiline_uses_dash_on_all_but_last() {
        let reply = Reply::multiline(250, vec!["mx.test".into(), "SIZE 100".into(), "HELP".into()]);
        assert_eq!(reply.to_wire(), "250-mx.test\r\n250-SIZE 100\r\n250 HELP\r\n");
    }

    #[test]
    fn test_empty_multiline_is_bare_code() {
        assert_eq!(Reply::multiline(250, Vec::new()).to_wire(), "250\r\n");
    }
}
