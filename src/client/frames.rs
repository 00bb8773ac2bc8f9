//! Byte stream to frame decoding.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use thiserror::Error;

/// One named frame off the wire, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// The job stream could not be opened, or broke before its terminal event.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(#[from] reqwest::Error),

    #[error("Server rejected the job ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Stream failed: {0}")]
    Stream(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Stream closed before a terminal event")]
    ClosedBeforeTerminal,
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Turn any chunked byte stream into frames. Chunk boundaries may fall
/// anywhere, including inside a line; keep-alive comments never surface.
pub fn decode_frames<S, B, E>(bytes: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(bytes.eventsource().map(|item| match item {
        Ok(event) => Ok(Frame {
            event: event.event,
            data: event.data,
        }),
        Err(e) => Err(TransportError::Stream(e.to_string())),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(
        parts: &[&str],
    ) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    #[tokio::test]
    async fn frames_survive_arbitrary_chunk_boundaries() {
        let wire = "event: agent_start\ndata: {\"agentId\":\"a\",\"timestamp\":\"2024-01-01T00:00:00Z\"}\n\n\
                    : keepalive\n\n\
                    event: error\ndata: {\"message\":\"boom\"}\n\n";

        // Split at every possible single position, then byte by byte.
        for cut in 1..wire.len() {
            let (head, tail) = wire.split_at(cut);
            let frames: Vec<Frame> = decode_frames(chunked(&[head, tail]))
                .map(|f| f.unwrap())
                .collect()
                .await;
            assert_eq!(frames.len(), 2, "cut at {cut}");
            assert_eq!(frames[0].event, "agent_start");
            assert_eq!(frames[1], Frame::new("error", r#"{"message":"boom"}"#));
        }

        let bytes: Vec<String> = wire.chars().map(|c| c.to_string()).collect();
        let parts: Vec<&str> = bytes.iter().map(String::as_str).collect();
        let frames: Vec<Frame> = decode_frames(chunked(&parts))
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn transport_errors_are_surfaced() {
        let failing = futures::stream::iter(vec![
            Ok(b"event: step\ndata: {}\n\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let frames: Vec<_> = decode_frames(failing).collect().await;
        assert!(frames[0].is_ok());
        assert!(matches!(frames[1], Err(TransportError::Stream(_))));
    }
}
