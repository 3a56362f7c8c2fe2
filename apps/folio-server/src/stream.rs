//! Response Streamer
//!
//! Sends a finished [`Artifact`] to the client as a download. The body stream
//! owns the artifact, so its scratch files are only removed once the stream
//! is dropped: after the last chunk, after a read error, or when the client
//! goes away mid-transfer.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::convert::Artifact;
use crate::error::AppError;

/// Read size per body chunk
const CHUNK_SIZE: usize = 64 * 1024;

/// In-flight transfer of one artifact
struct Transfer<R> {
    artifact: Artifact,
    reader: R,
    sent: u64,
    finished: bool,
}

impl<R> Drop for Transfer<R> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                path = %self.artifact.file.path().display(),
                sent = self.sent,
                expected = self.artifact.size_bytes,
                "Transfer aborted before completion"
            );
        }
        // artifact drops next, removing both scratch files
    }
}

/// Build the download response for `artifact`
pub async fn artifact_response(artifact: Artifact) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(artifact.file.path())
        .await
        .map_err(|e| AppError::Internal(format!("failed to open artifact: {}", e)))?;

    let disposition = HeaderValue::from_str(&content_disposition(&artifact.suggested_filename))
        .map_err(|e| AppError::Internal(format!("invalid content disposition: {}", e)))?;
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(artifact.content_type)),
        (header::CONTENT_LENGTH, HeaderValue::from(artifact.size_bytes)),
        (header::CONTENT_DISPOSITION, disposition),
    ];

    Ok((StatusCode::OK, headers, Body::from_stream(transfer_stream(artifact, file))).into_response())
}

/// Chunked body over `reader`; owns `artifact` until the stream ends or is dropped
fn transfer_stream<R>(artifact: Artifact, reader: R) -> impl Stream<Item = std::io::Result<Bytes>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let transfer = Transfer {
        artifact,
        reader,
        sent: 0,
        finished: false,
    };

    stream::unfold(Some(transfer), |state| async move {
        let mut transfer = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];

        let result = match transfer.reader.read(&mut buf).await {
            Ok(0) if transfer.sent < transfer.artifact.size_bytes => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "artifact shorter than announced",
            )),
            other => other,
        };

        match result {
            Ok(0) => {
                transfer.finished = true;
                tracing::debug!(
                    file_name = %transfer.artifact.suggested_filename,
                    bytes = transfer.sent,
                    "Artifact streamed"
                );
                None
            }
            Ok(n) => {
                buf.truncate(n);
                transfer.sent += n as u64;
                Some((Ok(Bytes::from(buf)), Some(transfer)))
            }
            Err(e) => {
                transfer.finished = true;
                tracing::warn!(
                    path = %transfer.artifact.file.path().display(),
                    sent = transfer.sent,
                    expected = transfer.artifact.size_bytes,
                    error = %e,
                    "Transport error while streaming artifact"
                );
                Some((Err(e), None))
            }
        }
    })
}

/// `attachment` disposition with an ASCII fallback name and an RFC 5987 UTF-8 name
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::DOCX_MIME_TYPE;
    use crate::scratch::ScratchDir;
    use tempfile::TempDir;

    async fn artifact(scratch: &ScratchDir, bytes: &[u8]) -> Artifact {
        let source = scratch.adopt(scratch.allocate("pdf"));
        let file = scratch.adopt(scratch.allocate("docx"));
        tokio::fs::write(source.path(), b"%PDF").await.unwrap();
        tokio::fs::write(file.path(), bytes).await.unwrap();
        Artifact {
            file,
            source,
            content_type: DOCX_MIME_TYPE,
            suggested_filename: "report.docx".to_string(),
            size_bytes: bytes.len() as u64,
        }
    }

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("report.docx"),
            "attachment; filename=\"report.docx\"; filename*=UTF-8''report.docx"
        );
    }

    #[test]
    fn test_content_disposition_unicode() {
        let value = content_disposition("résumé.docx");
        assert!(value.starts_with("attachment; filename=\"r_sum_.docx\""));
        assert!(value.ends_with("filename*=UTF-8''r%C3%A9sum%C3%A9.docx"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[tokio::test]
    async fn test_streams_then_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path());
        let payload: Vec<u8> = (0..CHUNK_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();

        let response = artifact_response(artifact(&scratch, &payload).await).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], DOCX_MIME_TYPE);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], payload.len().to_string().as_str());

        // still present while the body is pending
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 2);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), payload.as_slice());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    /// Hands out one chunk, then fails every read
    struct FailingReader {
        served: bool,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.served {
                return std::task::Poll::Ready(Err(std::io::Error::other("disk went away")));
            }
            self.served = true;
            buf.put_slice(b"partial");
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_error_ends_stream_and_cleans_up() {
        use futures::StreamExt;

        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path());
        let artifact = artifact(&scratch, &[0u8; 64]).await;

        let mut body = Box::pin(transfer_stream(artifact, FailingReader { served: false }));

        assert_eq!(body.next().await.unwrap().unwrap().as_ref(), b"partial");
        let err = body.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "disk went away");
        assert!(body.next().await.is_none());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_truncated_artifact_is_transport_error() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path());
        let payload = vec![7u8; 4096];
        let artifact = artifact(&scratch, &payload).await;
        let path = artifact.file.path().to_path_buf();

        let response = artifact_response(artifact).await.unwrap();
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(100)
            .unwrap();

        let result = axum::body::to_bytes(response.into_body(), usize::MAX).await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_body_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path());

        let response = artifact_response(artifact(&scratch, b"docx bytes").await).await.unwrap();
        drop(response);

        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
