//! STOMP 1.2 frame model and text codec.
//!
//! A frame is a command line, header lines, a blank line, then a body
//! terminated by NUL. Header values are escaped (`\\`, `\n`, `\r`, `\c`)
//! in every frame except CONNECT, STOMP and CONNECTED. When a
//! `content-length` header is present the body is read by length, so it may
//! contain NUL bytes.

use std::fmt;

use thiserror::Error;

/// Errors produced while decoding client frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The command line is not a STOMP command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    /// A header line has no `:` separator.
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    /// A header uses an escape sequence STOMP 1.2 does not define.
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),
    /// `content-length` is not a number or overruns the frame.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
    /// The frame ends before its terminating NUL.
    #[error("frame is not NUL-terminated")]
    Unterminated,
    /// Command, headers or body are not UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

/// STOMP commands, client and server side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client: open a session.
    Connect,
    /// Client: alias for CONNECT.
    Stomp,
    /// Client: send a message to a destination.
    Send,
    /// Client: subscribe to a destination.
    Subscribe,
    /// Client: cancel a subscription.
    Unsubscribe,
    /// Client: acknowledge a message.
    Ack,
    /// Client: reject a message.
    Nack,
    /// Client: start a transaction.
    Begin,
    /// Client: commit a transaction.
    Commit,
    /// Client: roll back a transaction.
    Abort,
    /// Client: close the session.
    Disconnect,
    /// Server: session accepted.
    Connected,
    /// Server: a message for a subscription.
    Message,
    /// Server: acknowledges a client `receipt` request.
    Receipt,
    /// Server: something went wrong.
    Error,
}

impl Command {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a command line.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        })
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One STOMP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    headers: Vec<(String, String)>,
    /// Frame body.
    pub body: String,
}

impl Frame {
    /// Empty frame with the given command.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header called `name`. Repeated headers after the
    /// first are ignored.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All headers in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// CONNECTED reply for a STOMP 1.2 session without heart-beating.
    pub fn connected(server: &str) -> Self {
        Self::new(Command::Connected)
            .with_header("version", "1.2")
            .with_header("heart-beat", "0,0")
            .with_header("server", server)
    }

    /// MESSAGE frame carrying a JSON body for one subscription.
    pub fn message(subscription: &str, message_id: &str, destination: &str, body: String) -> Self {
        Self::new(Command::Message)
            .with_header("subscription", subscription)
            .with_header("message-id", message_id)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// RECEIPT for a client frame that carried a `receipt` header.
    pub fn receipt(receipt_id: &str) -> Self {
        Self::new(Command::Receipt).with_header("receipt-id", receipt_id)
    }

    /// ERROR frame with a short `message` header and longer details in the
    /// body.
    pub fn error(message: &str, details: &str, receipt_id: Option<&str>) -> Self {
        let mut frame = Self::new(Command::Error).with_header("message", message);
        if let Some(id) = receipt_id {
            frame = frame.with_header("receipt-id", id);
        }
        frame
            .with_header("content-type", "text/plain")
            .with_body(details)
    }

    /// Serialize to wire text, NUL terminator included.
    ///
    /// A `content-length` header is added for non-empty bodies that do not
    /// already carry one.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            push_header_part(&mut out, name, escape);
            out.push(':');
            push_header_part(&mut out, value, escape);
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Decode every frame in one transport message.
///
/// Bare EOLs between frames are heart-beats and are skipped, so a message
/// consisting only of `"\n"` decodes to no frames.
pub fn decode(input: &[u8]) -> Result<Vec<Frame>, FrameError> {
    let mut frames = Vec::new();
    let mut rest = input;
    loop {
        rest = skip_heartbeats(rest);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, consumed) = decode_one(rest)?;
        frames.push(frame);
        rest = &rest[consumed..];
    }
}

fn skip_heartbeats(mut buf: &[u8]) -> &[u8] {
    loop {
        match buf {
            [b'\n', tail @ ..] | [b'\r', b'\n', tail @ ..] => buf = tail,
            _ => return buf,
        }
    }
}

/// Returns the line without its EOL and the offset just past the EOL.
fn next_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rel = buf[start..].iter().position(|&b| b == b'\n')?;
    let end = start + rel;
    let line = &buf[start..end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Some((line, end + 1))
}

fn utf8(bytes: &[u8]) -> Result<&str, FrameError> {
    std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)
}

fn decode_one(buf: &[u8]) -> Result<(Frame, usize), FrameError> {
    let (line, mut pos) = next_line(buf, 0).ok_or(FrameError::Unterminated)?;
    let command_text = utf8(line)?;
    let command = Command::parse(command_text)
        .ok_or_else(|| FrameError::UnknownCommand(command_text.to_string()))?;
    let escaped = command.escapes_headers();

    let mut frame = Frame::new(command);
    loop {
        let (line, next) = next_line(buf, pos).ok_or(FrameError::Unterminated)?;
        pos = next;
        if line.is_empty() {
            break;
        }
        let text = utf8(line)?;
        let (name, value) = text
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(text.to_string()))?;
        if escaped {
            frame.headers.push((unescape(name)?, unescape(value)?));
        } else {
            frame.headers.push((name.to_string(), value.to_string()));
        }
    }

    let (body, end) = match frame.header("content-length") {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
            let end = pos
                .checked_add(len)
                .filter(|&end| end < buf.len())
                .ok_or_else(|| FrameError::InvalidContentLength(raw.to_string()))?;
            if buf[end] != 0 {
                return Err(FrameError::Unterminated);
            }
            (&buf[pos..end], end)
        }
        None => {
            let rel = buf[pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or(FrameError::Unterminated)?;
            (&buf[pos..pos + rel], pos + rel)
        }
    };
    frame.body = utf8(body)?.to_string();
    Ok((frame, end + 1))
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

fn push_header_part(out: &mut String, raw: &str, escape: bool) {
    if !escape {
        out.push_str(raw);
        return;
    }
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}
