//! Framing and decoding for the realtime chat stream.
//!
//! The stream body is a sequence of JSON documents separated by `\n` or `\r`,
//! interleaved with keep-alive padding that carries no data.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Method;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;

use crate::error::GitterError;
use crate::models::Message;
use crate::transport::{ByteStream, HttpRequest, StreamResponse, Transport};

/// How long a rejected stream request may take to deliver its error body.
const REJECTION_BODY_WAIT: Duration = Duration::from_secs(2);

/// URL of the realtime message stream for a room.
pub(crate) fn build_stream_url(stream_base: &str, room_id: &str) -> String {
    format!(
        "{}/rooms/{}/chatMessages",
        stream_base.trim_end_matches('/'),
        urlencoding::encode(room_id)
    )
}

/// Splits the body on CR or LF. Delimiters are not part of the frame.
#[derive(Debug, Default)]
pub(crate) struct FrameCodec {
    next_index: usize,
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        let offset = buf[self.next_index..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r');
        match offset {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;
                let mut frame = buf.split_to(end + 1);
                frame.truncate(end);
                Ok(Some(frame.freeze()))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(buf.split().freeze()))
    }
}

/// Whether a frame carries no data: empty, whitespace, or keep-alive padding.
pub(crate) fn is_keepalive(frame: &[u8], keepalive: char) -> bool {
    match std::str::from_utf8(frame) {
        Ok(text) => text
            .chars()
            .all(|c| c == keepalive || c.is_ascii_whitespace()),
        Err(_) => false,
    }
}

/// Decode one frame. Keep-alive frames yield `Ok(None)`.
pub(crate) fn decode_frame(frame: &[u8], keepalive: char) -> Result<Option<Message>, GitterError> {
    if is_keepalive(frame, keepalive) {
        return Ok(None);
    }
    let message = serde_json::from_slice(frame)
        .map_err(|e| GitterError::Decode(format!("malformed stream frame: {e}")))?;
    Ok(Some(message))
}

/// Read the error body of a rejected stream request, keeping whatever arrived
/// within `wait`.
async fn read_rejection_body(mut body: ByteStream, wait: Duration) -> Bytes {
    let mut buf = BytesMut::new();
    let read = async {
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok::<_, GitterError>(())
    };
    let outcome = tokio::time::timeout(wait, read).await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(error = %e, received = buf.len(), "failed to read rejection body");
        }
        Err(_) => {
            tracing::warn!(
                wait_ms = wait.as_millis() as u64,
                received = buf.len(),
                "rejection body did not finish, keeping partial body"
            );
        }
    }
    buf.freeze()
}

/// What ended a [`StreamConnection`].
#[derive(Debug)]
pub(crate) enum Disconnect {
    /// The server finished the response body.
    Closed,
    /// The connection failed mid-stream.
    Io(std::io::Error),
}

/// One frame of the stream, after keep-alive filtering.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Message(Message),
    KeepAlive,
    Disconnected(Disconnect),
}

type IoByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A live streaming response for one room.
pub(crate) struct StreamConnection {
    frames: FramedRead<StreamReader<IoByteStream, Bytes>, FrameCodec>,
    keepalive: char,
}

impl StreamConnection {
    /// Issue the streaming GET. Non-2xx responses are returned as `Api` errors
    /// with their body; anything below HTTP is a `Transport` error.
    pub async fn open(
        transport: &dyn Transport,
        url: &str,
        headers: reqwest::header::HeaderMap,
        keepalive: char,
    ) -> Result<Self, GitterError> {
        let mut request = HttpRequest::new(Method::GET, url);
        request.headers = headers;
        let resp = transport.open_stream(request).await?;
        if !resp.is_success() {
            let status = resp.status;
            let body = read_rejection_body(resp.body, REJECTION_BODY_WAIT).await;
            return Err(crate::error::api_error(status, &body));
        }
        Ok(Self::from_response(resp, keepalive))
    }

    pub fn from_response(resp: StreamResponse, keepalive: char) -> Self {
        let body: IoByteStream = resp.body.map_err(std::io::Error::other).boxed();
        let frames = FramedRead::new(StreamReader::new(body), FrameCodec::default());
        Self { frames, keepalive }
    }

    /// Wait for the next frame. Decode failures are returned as errors and end the
    /// useful life of the connection.
    pub async fn next_event(&mut self) -> Result<StreamEvent, GitterError> {
        match self.frames.next().await {
            Some(Ok(frame)) => Ok(match decode_frame(&frame, self.keepalive)? {
                Some(message) => StreamEvent::Message(message),
                None => StreamEvent::KeepAlive,
            }),
            Some(Err(e)) => Ok(StreamEvent::Disconnected(Disconnect::Io(e))),
            None => Ok(StreamEvent::Disconnected(Disconnect::Closed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(input: &[u8]) -> Vec<Bytes> {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            out.push(frame);
        }
        if let Some(frame) = codec.decode_eof(&mut buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn splits_on_lf_and_cr() {
        let out = frames(b"{\"id\":\"1\"}\n{\"id\":\"2\"}\r{\"id\":\"3\"}");
        assert_eq!(out.len(), 3);
        assert_eq!(&out[0][..], b"{\"id\":\"1\"}");
        assert_eq!(&out[1][..], b"{\"id\":\"2\"}");
        assert_eq!(&out[2][..], b"{\"id\":\"3\"}");
    }

    #[test]
    fn crlf_yields_an_empty_frame() {
        let out = frames(b"{\"id\":\"1\"}\r\n");
        assert_eq!(out.len(), 2);
        assert!(out[1].is_empty());
    }

    #[test]
    fn partial_frame_waits_for_delimiter() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"{\"id\":"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\"7\"}\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"{\"id\":\"7\"}");
        assert!(buf.is_empty());
    }

    #[test]
    fn keepalive_frames_are_skipped() {
        assert!(decode_frame(b"", ' ').unwrap().is_none());
        assert!(decode_frame(b"   ", ' ').unwrap().is_none());
        assert!(decode_frame(b"...", '.').unwrap().is_none());
        assert!(decode_frame(b" . ", '.').unwrap().is_none());
    }

    #[test]
    fn malformed_frame_is_decode_error() {
        let err = decode_frame(b"{\"id\":\"3\",", ' ').unwrap_err();
        assert!(err.is_decode());
        let err = decode_frame(b"{\"text\":\"no id\"}", ' ').unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn stream_url_encodes_room_id() {
        assert_eq!(
            build_stream_url("https://stream.gitter.im/v1/", "room 1"),
            "https://stream.gitter.im/v1/rooms/room%201/chatMessages"
        );
    }

    #[tokio::test]
    async fn connection_yields_messages_in_order() {
        let body = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"id\":\"1\",\"text\":\"hi\"}\n \n{\"id\":")),
            Ok(Bytes::from_static(b"\"2\",\"text\":\"yo\"}\n")),
        ])
        .boxed();
        let mut conn = StreamConnection::from_response(StreamResponse { status: 200, body }, ' ');

        let StreamEvent::Message(first) = conn.next_event().await.unwrap() else {
            panic!("expected message");
        };
        assert_eq!(first.id, "1");
        assert!(matches!(conn.next_event().await.unwrap(), StreamEvent::KeepAlive));
        let StreamEvent::Message(second) = conn.next_event().await.unwrap() else {
            panic!("expected message");
        };
        assert_eq!(second.text, "yo");
        assert!(matches!(
            conn.next_event().await.unwrap(),
            StreamEvent::Disconnected(Disconnect::Closed)
        ));
    }

    #[tokio::test]
    async fn rejection_body_is_bounded() {
        let body = futures_util::stream::iter(vec![Ok(Bytes::from_static(b"Unauthor"))])
            .chain(futures_util::stream::pending())
            .boxed();
        let read = read_rejection_body(body, Duration::from_millis(50));
        let body = tokio::time::timeout(Duration::from_secs(5), read)
            .await
            .expect("rejection body read was not bounded");
        assert_eq!(&body[..], b"Unauthor");
    }

    #[tokio::test]
    async fn rejection_body_read_error_keeps_received_bytes() {
        let body = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"Bad ")),
            Err(GitterError::Transport("reset by peer".to_string())),
        ])
        .boxed();
        let body = read_rejection_body(body, Duration::from_secs(5)).await;
        assert_eq!(&body[..], b"Bad ");
    }

    #[tokio::test]
    async fn transport_error_is_a_disconnect() {
        let body = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"id\":\"1\"")),
            Err(GitterError::Transport("reset by peer".to_string())),
        ])
        .boxed();
        let mut conn = StreamConnection::from_response(StreamResponse { status: 200, body }, ' ');
        assert!(matches!(
            conn.next_event().await.unwrap(),
            StreamEvent::Disconnected(Disconnect::Io(_))
        ));
    }
}
