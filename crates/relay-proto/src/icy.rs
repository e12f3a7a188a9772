//! ICY (Shoutcast/Icecast) response parsing.
//!
//! The upstream answers with an HTTP-like header followed by a body that, when
//! `icy-metaint` was negotiated, interleaves audio and metadata:
//!
//! ```text
//!   ┌ metaint bytes audio ┐┌ n ┐┌ 16·n bytes metadata ┐┌ metaint bytes audio ┐ …
//! ```
//!
//! Reads from the socket land on arbitrary boundaries, so both phases are
//! explicit state machines that carry their partial line / partial block
//! across calls:
//!
//! - [`HeaderParser`] accumulates header lines and hands back any body bytes
//!   that arrived in the same read as the terminating blank line.
//! - [`BodySplitter`] turns body bytes into whole [`Block`]s, strictly in
//!   stream order.
//! - [`IcyStream`] drives both over an `AsyncRead`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::error::IcyError;

/// Status lines we accept from the upstream, compared verbatim.
pub const ACCEPTED_STATUS_LINES: [&[u8]; 3] =
    [b"ICY 200 OK", b"HTTP/1.0 200 OK", b"HTTP/1.1 200 OK"];

const METAINT_PREFIX: &[u8] = b"icy-metaint:";
const NAME_PREFIX: &[u8] = b"icy-name:";

/// Each metadata length byte counts units of this many bytes.
pub const METADATA_UNIT: usize = 16;

/// What the header told us about the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSession {
    /// Audio bytes between metadata blocks; `None` when the stream carries no
    /// embedded metadata.  Never `Some(0)`.
    pub metaint: Option<usize>,
    /// Raw `icy-name` value, empty when the upstream sent none.
    pub source_name: Vec<u8>,
}

impl StreamSession {
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.source_name).into_owned()
    }
}

/// Build the request we send upstream.
pub fn request(host: &str, resource: &str, metadata: bool) -> Vec<u8> {
    let mut req = format!("GET {} HTTP/1.0\r\nHost: {}\r\n", resource, host);
    if metadata {
        req.push_str("Icy-MetaData:1\r\n");
    }
    req.push_str("\r\n");
    req.into_bytes()
}

// ── header phase ─────────────────────────────────────────────────────────────

/// Result of a completed header: the session plus body bytes that were read
/// together with the blank line.
#[derive(Debug)]
pub struct HeaderDone {
    pub session: StreamSession,
    pub body: Vec<u8>,
}

pub struct HeaderParser {
    /// Current (possibly incomplete) line, CRLF included once seen.
    line: Vec<u8>,
    lines_seen: usize,
    consumed: usize,
    max_len: usize,
    session: StreamSession,
}

impl HeaderParser {
    pub fn new(max_len: usize) -> Self {
        Self {
            line: Vec::new(),
            lines_seen: 0,
            consumed: 0,
            max_len,
            session: StreamSession::default(),
        }
    }

    /// Feed the next read.  Returns `Some` once the blank line is found.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<HeaderDone>, IcyError> {
        for (i, &byte) in chunk.iter().enumerate() {
            self.consumed += 1;
            if self.consumed > self.max_len {
                return Err(IcyError::violation(format!(
                    "header exceeds {} bytes",
                    self.max_len
                )));
            }
            self.line.push(byte);
            if !self.line.ends_with(b"\r\n") {
                continue;
            }

            let end = self.line.len() - 2;
            let line = std::mem::take(&mut self.line);
            if self.accept_line(&line[..end])? {
                return Ok(Some(HeaderDone {
                    session: std::mem::take(&mut self.session),
                    body: chunk[i + 1..].to_vec(),
                }));
            }
        }
        Ok(None)
    }

    /// End of stream before the blank line.
    pub fn finish(self) -> IcyError {
        IcyError::violation(format!(
            "stream ended inside the header after {} lines",
            self.lines_seen
        ))
    }

    /// Returns `true` on the terminating blank line.
    fn accept_line(&mut self, line: &[u8]) -> Result<bool, IcyError> {
        let first = self.lines_seen == 0;
        self.lines_seen += 1;

        if first {
            if !ACCEPTED_STATUS_LINES.iter().any(|ok| *ok == line) {
                return Err(IcyError::violation(format!(
                    "unexpected status line {:?}",
                    String::from_utf8_lossy(line)
                )));
            }
            return Ok(false);
        }

        if line.is_empty() {
            return Ok(true);
        }

        if let Some(value) = strip_prefix_ignore_case(line, METAINT_PREFIX) {
            let metaint = std::str::from_utf8(value.trim_ascii())
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&v| v > 0)
                .ok_or_else(|| {
                    IcyError::violation(format!(
                        "invalid icy-metaint {:?}",
                        String::from_utf8_lossy(value)
                    ))
                })?;
            self.session.metaint = Some(metaint);
        } else if let Some(value) = strip_prefix_ignore_case(line, NAME_PREFIX) {
            self.session.source_name = value.trim_ascii().to_vec();
        } else {
            trace!("icy: ignoring header line {:?}", String::from_utf8_lossy(line));
        }
        Ok(false)
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

// ── body phase ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Audio,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub data: Vec<u8>,
}

impl Block {
    pub fn audio(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: BlockKind::Audio,
            data: data.into(),
        }
    }

    pub fn metadata(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: BlockKind::Metadata,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Audio { remaining: usize },
    LengthByte,
    Metadata { remaining: usize },
}

pub struct BodySplitter {
    metaint: Option<usize>,
    expect: Expect,
    pending: Vec<u8>,
}

impl BodySplitter {
    pub fn new(metaint: Option<usize>) -> Self {
        Self {
            metaint,
            expect: Expect::Audio {
                remaining: metaint.unwrap_or(0),
            },
            pending: Vec::new(),
        }
    }

    /// Split `input` and append every block it completes to `out`.
    ///
    /// Without a metadata interval each non-empty read is one audio block.
    /// A zero length byte means "no metadata this round"; no empty metadata
    /// block is emitted for it.
    pub fn feed(&mut self, mut input: &[u8], out: &mut Vec<Block>) {
        let Some(metaint) = self.metaint else {
            if !input.is_empty() {
                out.push(Block::audio(input));
            }
            return;
        };

        while !input.is_empty() {
            match self.expect {
                Expect::Audio { remaining } => {
                    let n = remaining.min(input.len());
                    self.pending.extend_from_slice(&input[..n]);
                    input = &input[n..];
                    if n == remaining {
                        out.push(Block::audio(std::mem::take(&mut self.pending)));
                        self.expect = Expect::LengthByte;
                    } else {
                        self.expect = Expect::Audio {
                            remaining: remaining - n,
                        };
                    }
                }
                Expect::LengthByte => {
                    let len = input[0] as usize * METADATA_UNIT;
                    input = &input[1..];
                    self.expect = if len == 0 {
                        Expect::Audio { remaining: metaint }
                    } else {
                        Expect::Metadata { remaining: len }
                    };
                }
                Expect::Metadata { remaining } => {
                    let n = remaining.min(input.len());
                    self.pending.extend_from_slice(&input[..n]);
                    input = &input[n..];
                    if n == remaining {
                        out.push(Block::metadata(std::mem::take(&mut self.pending)));
                        self.expect = Expect::Audio { remaining: metaint };
                    } else {
                        self.expect = Expect::Metadata {
                            remaining: remaining - n,
                        };
                    }
                }
            }
        }
    }

    /// Hand back whatever partial block is pending at end of stream.
    pub fn finish(&mut self) -> Option<Block> {
        if self.pending.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.pending);
        match self.expect {
            Expect::Metadata { .. } => Some(Block::metadata(data)),
            _ => Some(Block::audio(data)),
        }
    }
}

// ── async driver ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub buffer_len: usize,
    pub max_header_len: usize,
    /// Bound on each individual read; expiry is a hard read failure.
    pub read_timeout: Option<Duration>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            buffer_len: 4096,
            max_header_len: 64 * 1024,
            read_timeout: None,
        }
    }
}

/// An upstream response whose header has been consumed.
pub struct IcyStream<R> {
    reader: R,
    buf: Vec<u8>,
    read_timeout: Option<Duration>,
    session: StreamSession,
    splitter: BodySplitter,
    leftover: Option<Vec<u8>>,
}

impl<R: AsyncRead + Unpin> IcyStream<R> {
    /// Read and validate the header.
    pub async fn open(mut reader: R, opts: ReadOptions) -> Result<Self, IcyError> {
        let mut buf = vec![0u8; opts.buffer_len.max(1)];
        let mut header = HeaderParser::new(opts.max_header_len);

        let done = loop {
            let n = read_with_timeout(&mut reader, &mut buf, opts.read_timeout).await?;
            if n == 0 {
                return Err(header.finish());
            }
            if let Some(done) = header.feed(&buf[..n])? {
                break done;
            }
        };

        debug!(
            "icy: header done, metaint={:?}, name={:?}, {} body bytes already read",
            done.session.metaint,
            done.session.display_name(),
            done.body.len()
        );

        Ok(Self {
            reader,
            buf,
            read_timeout: opts.read_timeout,
            splitter: BodySplitter::new(done.session.metaint),
            session: done.session,
            leftover: Some(done.body),
        })
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Read once and append completed blocks to `out`.  Returns `false` at end
    /// of stream, after flushing any partial block.
    pub async fn next_blocks(&mut self, out: &mut Vec<Block>) -> Result<bool, IcyError> {
        if let Some(body) = self.leftover.take() {
            self.splitter.feed(&body, out);
            return Ok(true);
        }

        let n = read_with_timeout(&mut self.reader, &mut self.buf, self.read_timeout).await?;
        if n == 0 {
            out.extend(self.splitter.finish());
            return Ok(false);
        }
        self.splitter.feed(&self.buf[..n], out);
        Ok(true)
    }
}

async fn read_with_timeout<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, IcyError> {
    let n = match timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(buf))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream read timed out")
            })??,
        None => reader.read(buf).await?,
    };
    Ok(n)
}
