use crate::request::{Body, HttpRequest};
use anyhow::Context;
use greenroom_core::types::EncodedAsset;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscribeConfig {
    /// Endpoint receiving the multipart upload, e.g. `http://host/api/transcribe`.
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl AudioUpload {
    /// Name the upload after the session so retried sessions never collide.
    pub fn for_asset(asset: &EncodedAsset) -> Self {
        Self {
            filename: format!("{}.wav", asset.session),
            mime_type: asset.mime_type.clone(),
            bytes: asset.bytes.clone(),
        }
    }
}

/// Build the transcription upload: the question rides along as a query
/// parameter, the audio as a multipart `file` part.
pub fn build_transcribe_request(
    cfg: &TranscribeConfig,
    upload: &AudioUpload,
    question: &str,
) -> anyhow::Result<HttpRequest> {
    let mut url = Url::parse(&cfg.endpoint).context("parse transcribe endpoint")?;
    url.query_pairs_mut().append_pair("question", question);

    let boundary = format!("Boundary-{}", uuid::Uuid::new_v4());

    let mut body: Vec<u8> = Vec::new();
    append_file(
        &mut body,
        &boundary,
        "file",
        &upload.filename,
        &upload.mime_type,
        &upload.bytes,
    );
    append_field(&mut body, &boundary, "model", "whisper-1");
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Ok(HttpRequest {
        method: "POST".into(),
        url: url.to_string(),
        headers: vec![
            (
                "Content-Type".into(),
                format!("multipart/form-data; boundary={}", boundary),
            ),
            ("Accept".into(), "application/json".into()),
        ],
        body: Body::MultipartFormData { boundary, bytes: body },
    })
}

fn append_field(body: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
    );
    body.extend_from_slice(value.as_bytes());
    body.extend_from_slice(b"\r\n");
}

fn append_file(
    body: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    filename: &str,
    mime_type: &str,
    bytes: &[u8],
) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            name, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
}
