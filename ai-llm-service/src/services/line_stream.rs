//! Byte-stream framing helpers for streaming HTTP responses.
//!
//! Both streaming APIs we talk to are line-oriented:
//! - OpenAI-compatible endpoints send Server-Sent Events (`data: {...}` lines,
//!   terminated by `data: [DONE]`)
//! - Ollama sends newline-delimited JSON objects
//!
//! [`split_lines`] turns an arbitrary chunked body into complete lines, and
//! [`parse_sse_line`] classifies one SSE line.

use futures::stream::{self, Stream, StreamExt};

/// Splits a chunked byte stream into UTF-8 lines (without `\n` / `\r\n`).
///
/// A trailing line without a newline is emitted when the source ends. The
/// first transport error is forwarded and ends the stream.
pub fn split_lines<S, B, E>(source: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = (Box::pin(source), Vec::<u8>::new(), false);
    stream::unfold(state, |(mut src, mut buf, mut eof)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                let text = String::from_utf8_lossy(&line).into_owned();
                return Some((Ok(text), (src, buf, eof)));
            }
            if eof {
                if buf.is_empty() {
                    return None;
                }
                let text = String::from_utf8_lossy(&buf).into_owned();
                buf.clear();
                return Some((Ok(text), (src, buf, eof)));
            }
            match src.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    buf.clear();
                    return Some((Err(e), (src, buf, true)));
                }
                None => eof = true,
            }
        }
    })
}

/// One classified SSE line.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// `data:` payload (JSON for chat completions).
    Data(&'a str),
    /// `data: [DONE]` sentinel.
    Done,
    /// Blank separators, comments, `event:`/`id:` fields.
    Skip,
}

pub fn parse_sse_line(line: &str) -> SseLine<'_> {
    let Some(rest) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = rest.trim();
    if payload == "[DONE]" {
        SseLine::Done
    } else if payload.is_empty() {
        SseLine::Skip
    } else {
        SseLine::Data(payload)
    }
}
