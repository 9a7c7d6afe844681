use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry_ms: Option<u64>,
    pub data: String,
}

impl SseFrame {
    /// Unnamed events and events named `message` carry snapshots.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("") | Some("message"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("buffer exceeds max size without delimiter: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
    #[error("frame is not valid utf-8: {0}")]
    Utf8(String),
    #[error("stream ended inside a frame ({pending} bytes pending)")]
    Truncated { pending: usize },
}

#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    pub frames: Vec<SseFrame>,
    pub errors: Vec<FrameError>,
}

#[derive(Debug, Default)]
struct FrameBuilder {
    event: Option<String>,
    id: Option<String>,
    retry_ms: Option<u64>,
    data: Vec<String>,
    size: usize,
    discarding: bool,
}

impl FrameBuilder {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.id.is_none() && self.retry_ms.is_none() && self.data.is_empty()
    }
}

/// Incremental `text/event-stream` decoder. Chunks may split lines and
/// frames at arbitrary byte offsets.
pub struct SseFrameDecoder {
    max_frame_bytes: usize,
    pending: Vec<u8>,
    current: FrameBuilder,
}

impl SseFrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: Vec::new(),
            current: FrameBuilder::default(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport {
        let mut report = DecodeReport::default();
        if !chunk.is_empty() {
            self.pending.extend_from_slice(chunk);
        }

        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            self.process_line(&line, &mut report);
        }

        if self.pending.len() > self.max_frame_bytes {
            report.errors.push(FrameError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
            self.current = FrameBuilder {
                discarding: true,
                ..FrameBuilder::default()
            };
        }

        report
    }

    /// Drops any partially received frame; incomplete events are never dispatched.
    pub fn finish(&mut self) -> DecodeReport {
        let mut report = DecodeReport::default();
        let pending = self.pending.len() + self.current.size;
        if pending > 0 && !self.current.discarding {
            report.errors.push(FrameError::Truncated { pending });
        }
        self.pending.clear();
        self.current = FrameBuilder::default();
        report
    }

    fn process_line(&mut self, line: &[u8], report: &mut DecodeReport) {
        if line.is_empty() {
            self.dispatch(report);
            return;
        }
        if self.current.discarding || line.starts_with(b":") {
            return;
        }

        self.current.size += line.len() + 1;
        if self.current.size > self.max_frame_bytes {
            report.errors.push(FrameError::OversizedFrame {
                size: self.current.size,
                max: self.max_frame_bytes,
            });
            self.current = FrameBuilder {
                discarding: true,
                ..FrameBuilder::default()
            };
            return;
        }

        let line = match std::str::from_utf8(line) {
            Ok(value) => value,
            Err(err) => {
                report.errors.push(FrameError::Utf8(err.to_string()));
                self.current = FrameBuilder {
                    discarding: true,
                    ..FrameBuilder::default()
                };
                return;
            }
        };
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.current.data.push(value.to_string()),
            "event" => self.current.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.current.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.current.retry_ms = Some(ms);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, report: &mut DecodeReport) {
        let builder = std::mem::take(&mut self.current);
        if builder.discarding || builder.is_empty() {
            return;
        }
        if builder.data.is_empty() && builder.retry_ms.is_none() {
            return;
        }
        report.frames.push(SseFrame {
            event: builder.event,
            id: builder.id,
            retry_ms: builder.retry_ms,
            data: builder.data.join("\n"),
        });
    }
}

impl Default for SseFrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}
