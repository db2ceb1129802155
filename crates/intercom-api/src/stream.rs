// Multipart (MJPEG) frame decoding.
//
// The device answers `snapshot?fps=N` with `multipart/x-mixed-replace`:
// a sequence of parts separated by `--{boundary}`, each with its own
// headers and usually a `Content-Length`. The decoder is push-based so it
// can be fed straight from a chunked HTTP body.

use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use bytes::{Buf, Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::error::Error;

/// A boxed stream of decoded frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, Error>> + Send>>;

/// Parts larger than this without a delimiter are treated as corruption.
const MAX_PART_BYTES: usize = 8 * 1024 * 1024;

/// One part of a multipart stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Incremental `multipart/*` decoder.
#[derive(Debug)]
pub struct MultipartDecoder {
    delimiter: Vec<u8>,
    buf: BytesMut,
    finished: bool,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        // Some firmware already prefixes the boundary parameter with dashes.
        let boundary = boundary.trim_start_matches("--");
        Self {
            delimiter: format!("--{boundary}").into_bytes(),
            buf: BytesMut::new(),
            finished: false,
        }
    }

    /// Build a decoder from a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mut parts = content_type.split(';');
        let essence = parts.next()?.trim();
        if !essence.to_ascii_lowercase().starts_with("multipart/") {
            return None;
        }
        parts
            .filter_map(|p| p.trim().split_once('='))
            .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
            .map(|(_, value)| value.trim().trim_matches('"'))
            .filter(|boundary| !boundary.is_empty())
            .map(Self::new)
    }

    /// Append body bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Whether the closing delimiter has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        if self.finished {
            return Ok(None);
        }

        let Some(start) = find(&self.buf, &self.delimiter) else {
            if self.buf.len() > MAX_PART_BYTES {
                return Err(Error::Stream("no multipart boundary in stream".into()));
            }
            return Ok(None);
        };
        let after_delim = start + self.delimiter.len();
        if self.buf.len() < after_delim + 2 {
            return Ok(None);
        }
        if &self.buf[after_delim..after_delim + 2] == b"--" {
            self.finished = true;
            self.buf.clear();
            return Ok(None);
        }

        let Some(header_len) = find(&self.buf[after_delim..], b"\r\n\r\n") else {
            return Ok(None);
        };
        let headers = String::from_utf8_lossy(&self.buf[after_delim..after_delim + header_len]);
        let content_type = header_value(&headers, "content-type");
        let content_length = header_value(&headers, "content-length")
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|_| Error::Stream(format!("bad part Content-Length '{v}'")))
            })
            .transpose()?;
        let body_start = after_delim + header_len + 4;

        let body_end = if let Some(len) = content_length {
            if len > MAX_PART_BYTES {
                return Err(Error::Stream(format!("part of {len} bytes exceeds limit")));
            }
            if self.buf.len() < body_start + len {
                return Ok(None);
            }
            body_start + len
        } else {
            let Some(next) = find(&self.buf[body_start..], &self.delimiter) else {
                if self.buf.len() - body_start > MAX_PART_BYTES {
                    return Err(Error::Stream("part exceeds size limit".into()));
                }
                return Ok(None);
            };
            let mut end = body_start + next;
            if self.buf[body_start..end].ends_with(b"\r\n") {
                end -= 2;
            }
            end
        };

        self.buf.advance(body_start);
        let data = self.buf.split_to(body_end - body_start).freeze();
        Ok(Some(Frame { content_type, data }))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn header_value(headers: &str, name: &str) -> Option<String> {
    headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim().to_owned())
}

/// Decode a multipart HTTP response into frames.
///
/// Each wait for body bytes is bounded by `idle_timeout`. Dropping the
/// stream drops the response and closes the connection.
pub fn frame_stream(resp: reqwest::Response, idle_timeout: Duration) -> Result<FrameStream, Error> {
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let mut decoder = MultipartDecoder::from_content_type(&content_type).ok_or_else(|| {
        Error::Stream(format!("expected a multipart response, got '{content_type}'"))
    })?;
    let mut body = Box::pin(resp.bytes_stream());

    let stream: FrameStream = Box::pin(try_stream! {
        loop {
            while let Some(frame) = decoder.next_frame()? {
                yield frame;
            }
            if decoder.is_finished() {
                break;
            }
            match tokio::time::timeout(idle_timeout, body.next()).await {
                Err(_) => Err(Error::Stream(format!(
                    "no data from camera for {}s",
                    idle_timeout.as_secs()
                )))?,
                Ok(None) => break,
                Ok(Some(chunk)) => decoder.push(&chunk.map_err(Error::Transport)?),
            }
        }
    });
    Ok(stream)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn part(body: &[u8], with_length: bool) -> Vec<u8> {
        let mut out = b"--frame\r\nContent-Type: image/jpeg\r\n".to_vec();
        if with_length {
            out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
        out
    }

    #[test]
    fn boundary_from_content_type() {
        assert!(MultipartDecoder::from_content_type("image/jpeg").is_none());
        assert!(MultipartDecoder::from_content_type("multipart/x-mixed-replace").is_none());
        let decoder =
            MultipartDecoder::from_content_type(r#"multipart/x-mixed-replace; boundary="frame""#)
                .unwrap();
        assert_eq!(decoder.delimiter, b"--frame");
        let decoder =
            MultipartDecoder::from_content_type("multipart/x-mixed-replace;boundary=--frame").unwrap();
        assert_eq!(decoder.delimiter, b"--frame");
    }

    #[test]
    fn decodes_parts_split_across_chunks() {
        let mut wire = part(b"\xff\xd8first\xff\xd9", true);
        wire.extend(part(b"\xff\xd8second\xff\xd9", true));

        let mut decoder = MultipartDecoder::new("frame");
        let mut frames = Vec::new();
        for chunk in wire.chunks(7) {
            decoder.push(chunk);
            while let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].data[..], b"\xff\xd8first\xff\xd9");
        assert_eq!(frames[1].content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn decodes_parts_without_content_length() {
        let mut wire = part(b"one", false);
        wire.extend(part(b"two", false));
        wire.extend_from_slice(b"--frame--\r\n");

        let mut decoder = MultipartDecoder::new("frame");
        decoder.push(&wire);
        assert_eq!(&decoder.next_frame().unwrap().unwrap().data[..], b"one");
        assert_eq!(&decoder.next_frame().unwrap().unwrap().data[..], b"two");
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert!(decoder.is_finished());
    }

    #[test]
    fn rejects_bad_content_length() {
        let mut decoder = MultipartDecoder::new("frame");
        decoder.push(b"--frame\r\nContent-Length: lots\r\n\r\nxx");
        assert!(matches!(decoder.next_frame(), Err(Error::Stream(_))));
    }
}
