use crate::request::{Body, HttpRequest};
use anyhow::{Context, anyhow};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tokio::sync::mpsc;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Audio uploads can take a while on slow links; still bounded so a broken
// endpoint cannot hang the session indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub async fn execute(req: &HttpRequest) -> anyhow::Result<HttpResponse> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("build http client")?;

    let builder = request_builder(&client, req)?;

    let resp = builder.send().await.context("http request failed")?;
    let status = resp.status().as_u16();
    let body = resp
        .bytes()
        .await
        .context("failed reading response body")?
        .to_vec();

    Ok(HttpResponse { status, body })
}

/// One decoded piece of a streamed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    /// Transport signalled end-of-data.
    Completed,
    /// Transport dropped mid-stream; everything already emitted stands.
    Interrupted(String),
}

pub struct StreamingResponse {
    pub status: u16,
    pub events: mpsc::Receiver<StreamEvent>,
}

/// Execute a request whose response body is consumed incrementally.
///
/// Fragments arrive on the returned channel strictly in transport order,
/// followed by exactly one `Completed` or `Interrupted`. Callers should check
/// `status` before consuming; dropping the receiver abandons the stream.
pub async fn execute_streaming(req: &HttpRequest) -> anyhow::Result<StreamingResponse> {
    // No overall timeout here: a generation stream legitimately runs for as
    // long as the model keeps writing.
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("build http client")?;

    let builder = request_builder(&client, req)?;
    let resp = builder.send().await.context("http request failed")?;
    let status = resp.status().as_u16();

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut decoder = Utf8FragmentDecoder::new();
        let mut body = resp.bytes_stream();

        while let Some(item) = body.next().await {
            match item {
                Ok(bytes) => {
                    let fragment = decoder.push(&bytes);
                    if !fragment.is_empty()
                        && tx.send(StreamEvent::Fragment(fragment)).await.is_err()
                    {
                        // Consumer went away; stop reading.
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(StreamEvent::Interrupted(e.to_string())).await;
                    return;
                }
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() && tx.send(StreamEvent::Fragment(tail)).await.is_err() {
            return;
        }
        let _ = tx.send(StreamEvent::Completed).await;
    });

    Ok(StreamingResponse { status, events: rx })
}

fn request_builder(
    client: &reqwest::Client,
    req: &HttpRequest,
) -> anyhow::Result<reqwest::RequestBuilder> {
    let mut headers = HeaderMap::new();
    for (k, v) in &req.headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .with_context(|| format!("invalid header name: {k}"))?;
        let value =
            HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
        headers.insert(name, value);
    }

    let builder = match req.method.as_str() {
        "GET" => client.get(&req.url),
        "POST" => client.post(&req.url),
        "PUT" => client.put(&req.url),
        "DELETE" => client.delete(&req.url),
        other => return Err(anyhow!("unsupported method: {other}")),
    }
    .headers(headers);

    Ok(match &req.body {
        Body::Empty => builder,
        Body::Json(s) => builder.body(s.clone()),
        Body::MultipartFormData { bytes, .. } => builder.body(bytes.clone()),
    })
}

/// Reassembles UTF-8 sequences that the transport split across chunks.
///
/// A trailing incomplete sequence is held back until the next push; genuinely
/// invalid bytes decode lossily rather than stalling the stream.
pub struct Utf8FragmentDecoder {
    pending: Vec<u8>,
}

impl Default for Utf8FragmentDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8FragmentDecoder {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let held_back = incomplete_suffix_len(&self.pending);
        let ready_len = self.pending.len() - held_back;
        let ready: Vec<u8> = self.pending.drain(..ready_len).collect();
        String::from_utf8_lossy(&ready).into_owned()
    }

    /// Flush whatever is still pending at end-of-stream.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => 0,
        // `error_len() == None` means the buffer ends inside a multi-byte
        // sequence that more input could complete.
        Err(e) if e.error_len().is_none() => bytes.len() - e.valid_up_to(),
        // An invalid byte will never become valid; let the lossy pass eat it.
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_straight_through() {
        let mut d = Utf8FragmentDecoder::new();
        assert_eq!(d.push(b"Good "), "Good ");
        assert_eq!(d.push(b"start."), "start.");
        assert_eq!(d.finish(), "");
    }

    #[test]
    fn multibyte_char_split_across_chunks_is_reassembled() {
        let mut d = Utf8FragmentDecoder::new();
        let bytes = "résumé".as_bytes();
        // Split in the middle of the first 'é' (0xC3 0xA9).
        assert_eq!(d.push(&bytes[..2]), "r");
        assert_eq!(d.push(&bytes[2..]), "ésumé");
    }

    #[test]
    fn lone_invalid_byte_decodes_lossily() {
        let mut d = Utf8FragmentDecoder::new();
        let out = d.push(&[b'o', b'k', 0xFF, b'!']);
        assert_eq!(out, "ok\u{FFFD}!");
    }

    #[test]
    fn truncated_stream_flushes_replacement_on_finish() {
        let mut d = Utf8FragmentDecoder::new();
        assert_eq!(d.push(&[0xC3]), "");
        assert_eq!(d.finish(), "\u{FFFD}");
    }
}
