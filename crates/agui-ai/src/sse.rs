//! Incremental decoding of `text/event-stream` response bodies.

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::AiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Line-oriented SSE decoder that tolerates frames and UTF-8 sequences split
/// across network chunks.
#[derive(Debug, Default)]
pub(crate) struct SseFrameDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseFrameDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, AiError> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = decode_line(&raw)?;
            if let Some(frame) = self.accept_line(line) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    pub(crate) fn finish(mut self) -> Result<Option<SseFrame>, AiError> {
        let raw = std::mem::take(&mut self.pending);
        if !raw.is_empty() {
            let line = decode_line(&raw)?;
            if let Some(frame) = self.accept_line(line) {
                return Ok(Some(frame));
            }
        }
        Ok(self.flush())
    }

    fn accept_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.flush();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(event) = line.strip_prefix("event:") {
            self.event = Some(event.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        None
    }

    fn flush(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data_lines.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data_lines).join("\n"),
        })
    }
}

fn decode_line(raw: &[u8]) -> Result<&str, AiError> {
    let line = std::str::from_utf8(raw).map_err(|error| {
        AiError::InvalidResponse(format!("invalid UTF-8 in streaming response: {error}"))
    })?;
    Ok(line.trim_end_matches(['\n', '\r']))
}

/// Feeds every SSE frame of `response` to `on_frame` in arrival order.
pub(crate) async fn read_sse_frames<F>(
    response: reqwest::Response,
    mut on_frame: F,
) -> Result<(), AiError>
where
    F: FnMut(SseFrame) -> Result<(), AiError>,
{
    let mut decoder = SseFrameDecoder::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        for frame in decoder.push(chunk?.as_ref())? {
            on_frame(frame)?;
        }
    }
    if let Some(frame) = decoder.finish()? {
        on_frame(frame)?;
    }
    Ok(())
}

pub(crate) fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("text/event-stream"))
}
