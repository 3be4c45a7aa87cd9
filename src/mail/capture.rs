use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::IngestError;

/// Materialize one in-flight message as a single frozen buffer.
///
/// Downstream consumers need random access to the whole message (the parser
/// and the archive upload each read it independently), so nothing runs
/// before capture completes. A stream error aborts the message: no buffer is
/// produced and no storage call is made for it.
pub async fn capture_stream<R: AsyncRead + Unpin>(mut reader: R) -> Result<Vec<u8>, IngestError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};

    use super::*;

    #[tokio::test]
    async fn buffer_equals_chunk_concatenation() {
        let chunks: Vec<&[u8]> = vec![b"From: x@y.com\r\n", b"\r\n", b"hello ", b"world"];
        let (mut tx, rx) = tokio::io::duplex(8);

        let writer = tokio::spawn(async move {
            for chunk in &[
                &b"From: x@y.com\r\n"[..],
                &b"\r\n"[..],
                &b"hello "[..],
                &b"world"[..],
            ] {
                tx.write_all(chunk).await.unwrap();
            }
        });

        let captured = capture_stream(rx).await.unwrap();
        writer.await.unwrap();

        assert_eq!(captured, chunks.concat());
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection dropped mid-message",
            )))
        }
    }

    #[tokio::test]
    async fn stream_error_produces_no_buffer() {
        let result = capture_stream(BrokenReader).await;
        assert!(matches!(result, Err(IngestError::Stream(_))));
    }
}
