//! Newline framing for the device's serial byte stream.
//!
//! # Why a framer is needed
//!
//! A serial port is a *byte stream*: one `read()` may return half a line, or
//! the tail of one line plus three more.  The device marks the end of every
//! message with `\n` (the firmware uses `println`, so lines actually end in
//! `\r\n`).  [`LineFramer`] accumulates bytes across reads and emits each
//! complete line exactly once, in arrival order, no matter how the reads were
//! chunked.
//!
//! # Bounded buffering
//!
//! A device that never emits a delimiter would otherwise make the buffer grow
//! forever.  The framer holds at most `max_frame_len` bytes.  When a line
//! exceeds that bound, everything buffered for it is discarded and the framer
//! *resynchronises*: it drops bytes until the next `\n`, then resumes normal
//! framing.  Lines within the bound are never affected.

use tracing::warn;

/// Default upper bound for a single frame, in bytes (delimiter excluded).
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// One complete line from the serial stream, with the `\n` (and a preceding
/// `\r`, if any) removed.  Never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Builds a frame from a raw line, stripping one trailing `\r`.
    ///
    /// Returns `None` for blank lines.
    fn from_line(mut line: Vec<u8>) -> Option<Self> {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(Self(line))
    }

    /// The frame's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; blank lines never become frames.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Frame {
    fn from(line: &str) -> Self {
        Self(line.as_bytes().to_vec())
    }
}

/// Splits an unbounded byte stream into newline-delimited [`Frame`]s.
///
/// Invariant: between calls, the internal buffer holds exactly the bytes
/// received since the last delimiter (or nothing while resynchronising), and
/// never more than `max_frame_len` bytes plus one trailing `\r`.
///
/// # Example
///
/// ```rust
/// use biometric_core::LineFramer;
///
/// let mut framer = LineFramer::new();
/// assert!(framer.feed(b"{\"status\":").is_empty());
/// let frames = framer.feed(b"\"OK\"}\r\n\n{\"a\":1}\n");
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[0].as_bytes(), b"{\"status\":\"OK\"}");
/// ```
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_frame_len: usize,
    resyncing: bool,
    overflows: u64,
}

impl LineFramer {
    /// Creates a framer bounded by [`DEFAULT_MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a framer that tolerates lines of up to `max_frame_len` bytes.
    ///
    /// A bound of zero is raised to one byte.
    pub fn with_max_len(max_frame_len: usize) -> Self {
        let max_frame_len = max_frame_len.max(1);
        Self {
            buffer: Vec::with_capacity(max_frame_len.min(1024)),
            max_frame_len,
            resyncing: false,
            overflows: 0,
        }
    }

    /// Appends `bytes` to the stream and returns every frame they complete.
    ///
    /// `bytes` may be empty and need not align with line boundaries.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            match rest.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let segment = &rest[..pos];
                    rest = &rest[pos + 1..];

                    if self.resyncing {
                        // The tail of an oversized line; drop it and resume.
                        self.resyncing = false;
                    } else {
                        let last = segment.last().or(self.buffer.last()).copied();
                        let len = self.buffer.len() + segment.len();
                        if !self.fits(len, last) {
                            self.record_overflow(len);
                            self.buffer.clear();
                            continue;
                        }
                        self.buffer.extend_from_slice(segment);
                        let line = std::mem::take(&mut self.buffer);
                        if let Some(frame) = Frame::from_line(line) {
                            frames.push(frame);
                        }
                    }
                }
                None => {
                    if !self.resyncing {
                        let len = self.buffer.len() + rest.len();
                        if !self.fits(len, rest.last().copied()) {
                            self.record_overflow(len);
                            self.buffer.clear();
                            self.resyncing = true;
                        } else {
                            self.buffer.extend_from_slice(rest);
                        }
                    }
                    rest = &[];
                }
            }
        }

        frames
    }

    /// Discards any buffered fragment and leaves the resynchronising state.
    ///
    /// Call this when the underlying link is re-opened.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.resyncing = false;
    }

    /// Number of bytes currently held for an incomplete line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// `true` while bytes are being dropped up to the next delimiter.
    pub fn is_resyncing(&self) -> bool {
        self.resyncing
    }

    /// How many oversized lines have been discarded so far.
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    /// The configured per-frame bound.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Whether `len` raw bytes ending in `last` can still become a frame.
    /// A trailing `\r` is stripped later and does not count.
    fn fits(&self, len: usize, last: Option<u8>) -> bool {
        len <= self.max_frame_len || (len == self.max_frame_len + 1 && last == Some(b'\r'))
    }

    fn record_overflow(&mut self, seen: usize) {
        self.overflows += 1;
        warn!(
            seen,
            max = self.max_frame_len,
            "serial line exceeded frame bound; discarding until next newline"
        );
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
