//! The wire codec (§4.1): buffered line I/O, the dot-stuffing transducer, and reply framing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ConnectionError, FramingError};

pub const DEFAULT_BUFFER_SIZE: usize = 8192;
pub const COMMAND_LINE_LIMIT: usize = 512;
pub const REPLY_LINE_LIMIT: usize = 2048;

/// A manually double-buffered reader/writer over one transport, mirroring the reference
/// session connection's `read_buf`/`read_pos`/`read_len` layout to minimize syscalls.
pub struct BufferedReader<S> {
    inner: S,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> BufferedReader<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, buf: vec![0; DEFAULT_BUFFER_SIZE], pos: 0, len: 0 }
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn fill(&mut self) -> Result<(), ConnectionError> {
        self.len = self.inner.read(&mut self.buf).await.map_err(ConnectionError::Receive)?;
        self.pos = 0;
        if self.len == 0 {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    /// Reads one line, terminated by `\n` (an immediately preceding `\r` is stripped; a bare
    /// `\n` is tolerated). Bounds the *raw* bytes consumed, including the terminator, by
    /// `max_bytes` (see SPEC_FULL.md §9.1(a) — this unifies on raw-bytes-including-CRLF
    /// rather than a post-hoc length subtraction).
    pub async fn read_line(&mut self, max_bytes: usize) -> Result<Vec<u8>, ConnectionError> {
        let mut out = Vec::new();
        let mut raw = 0usize;
        loop {
            if self.pos >= self.len {
                self.fill().await?;
            }
            let byte = self.buf[self.pos];
            self.pos += 1;
            raw += 1;
            if raw > max_bytes {
                self.drain_to_newline().await?;
                return Err(FramingError::LineTooLong { max: max_bytes }.into());
            }
            if byte == b'\n' {
                if out.last() == Some(&b'\r') {
                    out.pop();
                }
                return Ok(out);
            }
            if byte == 0 {
                // Let the caller see the NUL so it can count it as an invalid command;
                // still bound memory by continuing to respect `max_bytes` above.
                out.push(byte);
                continue;
            }
            out.push(byte);
        }
    }

    async fn drain_to_newline(&mut self) -> Result<(), ConnectionError> {
        loop {
            if self.pos >= self.len {
                self.fill().await?;
            }
            let byte = self.buf[self.pos];
            self.pos += 1;
            if byte == b'\n' {
                return Ok(());
            }
        }
    }

    /// Reads exactly `n` raw bytes with no dot processing (BDAT).
    pub async fn read_exact_raw(&mut self, n: usize) -> Result<Vec<u8>, ConnectionError> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if self.pos >= self.len {
                self.fill().await?;
            }
            let take = (n - out.len()).min(self.len - self.pos);
            out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
            self.pos += take;
        }
        Ok(out)
    }

    /// Reads a dot-stuffed body through [`DotReader`] until the `CRLF.CRLF` terminator,
    /// returning the destuffed content with the terminator's own CRLF excluded.
    pub async fn read_dot_body(&mut self, max_bytes: usize) -> Result<Vec<u8>, ConnectionError> {
        let mut transducer = DotReader::new();
        let mut out = Vec::new();
        while !transducer.is_ended() {
            if self.pos >= self.len {
                self.fill().await?;
            }
            let consumed = transducer.feed(&self.buf[self.pos..self.len], &mut out);
            self.pos += consumed;
            if out.len() > max_bytes {
                return Err(FramingError::LineTooLong { max: max_bytes }.into());
            }
        }
        Ok(out)
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        self.write_raw(&buf).await
    }

    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        self.inner.write_all(data).await.map_err(ConnectionError::Send)?;
        self.inner.flush().await.map_err(ConnectionError::Send)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DotState {
    BeginLine,
    InLine,
    SawCr,
    SawDotAtBol,
    SawDotCr,
    Ended,
}

/// The dot-stuffing reader transducer (§4.1). Operates on owned output buffers, so the
/// "one-byte pushback" the original design note calls for is unnecessary here: every output
/// byte a state transition produces is appended directly, however many bytes that is.
pub struct DotReader {
    state: DotState,
}

impl Default for DotReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DotReader {
    pub fn new() -> Self {
        Self { state: DotState::BeginLine }
    }

    pub fn is_ended(&self) -> bool {
        self.state == DotState::Ended
    }

    /// Feeds `input` through the transducer, appending destuffed bytes to `output`. Returns
    /// the number of input bytes consumed; any bytes after the terminator is found are left
    /// unconsumed (they belong to whatever the client pipelined next).
    pub fn feed(&mut self, input: &[u8], output: &mut Vec<u8>) -> usize {
        use DotState::*;
        let mut i = 0;
        while i < input.len() && self.state != Ended {
            let b = input[i];
            i += 1;
            match self.state {
                BeginLine => match b {
                    b'.' => self.state = SawDotAtBol,
                    b'\r' => {
                        output.push(b);
                        self.state = SawCr;
                    }
                    b'\n' => {
                        output.push(b);
                    }
                    _ => {
                        output.push(b);
                        self.state = InLine;
                    }
                },
                InLine => match b {
                    b'\r' => {
                        output.push(b);
                        self.state = SawCr;
                    }
                    b'\n' => {
                        output.push(b);
                        self.state = BeginLine;
                    }
                    _ => output.push(b),
                },
                SawCr => match b {
                    b'\n' => {
                        output.push(b);
                        self.state = BeginLine;
                    }
                    b'\r' => output.push(b),
                    _ => {
                        output.push(b);
                        self.state = InLine;
                    }
                },
                SawDotAtBol => match b {
                    b'.' => {
                        output.push(b'.');
                        self.state = InLine;
                    }
                    b'\r' => self.state = SawDotCr,
                    b'\n' => self.state = Ended,
                    _ => {
                        output.push(b'.');
                        output.push(b);
                        self.state = InLine;
                    }
                },
                SawDotCr => match b {
                    b'\n' => self.state = Ended,
                    _ => {
                        output.push(b'.');
                        output.push(b'\r');
                        output.push(b);
                        self.state = InLine;
                    }
                },
                Ended => unreachable!("loop condition excludes Ended"),
            }
        }
        i
    }
}

/// The dot-stuffing writer (§4.1): doubles any line-leading `.` and appends the
/// `CRLF.CRLF` terminator on [`DotWriter::close`].
pub struct DotWriter<W> {
    inner: W,
    at_bol: bool,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> DotWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, at_bol: true, closed: false }
    }

    pub async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        let mut staged = Vec::with_capacity(data.len());
        for &b in data {
            if self.at_bol && b == b'.' {
                staged.push(b'.');
            }
            staged.push(b);
            self.at_bol = b == b'\n';
        }
        self.inner.write_all(&staged).await
    }

    pub async fn close(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.at_bol {
            self.inner.write_all(b"\r\n").await?;
        }
        self.inner.write_all(b".\r\n").await?;
        self.inner.flush().await
    }
}

/// Parses one reply line (without its CRLF) into `(code, is_continuation, text)`.
pub fn parse_reply_line(line: &str) -> Result<(u32, bool, String), FramingError> {
    if line.len() < 3 || !line.as_bytes()[..3.min(line.len())].iter().all(u8::is_ascii_digit) {
        return Err(FramingError::MalformedCode(line.to_string()));
    }
    let code: u32 =
        line[..3].parse().map_err(|_| FramingError::MalformedCode(line.to_string()))?;
    if line.len() == 3 {
        return Ok((code, false, String::new()));
    }
    match line.as_bytes()[3] {
        b'-' => Ok((code, true, line[4..].to_string())),
        b' ' => Ok((code, false, line[4..].to_string())),
        _ => Err(FramingError::InvalidSeparator(line.to_string())),
    }
}

/// Formats a full reply from a code and its text lines (no enhanced-code handling; callers
/// needing enhanced codes on every line should pre-format each `text` entry, as
/// `smtp_common::ProtocolError::lines` does).
pub fn format_reply_lines(code: u32, texts: &[impl AsRef<str>]) -> String {
    if texts.is_empty() {
        return format!("{code:03} \r\n");
    }
    let last = texts.len() - 1;
    let mut out = String::new();
    for (i, text) in texts.iter().enumerate() {
        let sep = if i == last { ' ' } else { '-' };
        out.push_str(&format!("{code:03}{sep}{}\r\n", text.as_ref()));
    }
    out
}
