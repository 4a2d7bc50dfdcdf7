#![allow(dead_code)]
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use gitter::{
    Config, GitterClient, GitterError, HttpRequest, HttpResponse, ReconnectPolicy,
    StreamResponse, Transport,
};
use tokio::sync::mpsc;

/// Scripted reply to one `open_stream` call.
pub enum StreamScript {
    /// 200 response whose body is fed by the paired sender.
    Live(mpsc::UnboundedReceiver<Result<Bytes, GitterError>>),
    /// 200 response with a fixed body that then ends.
    Fixed(Vec<&'static str>),
    /// Non-2xx response.
    Reject(u16, &'static str),
    /// Connection failure.
    Fail(&'static str),
    /// Request that never gets a response.
    Stall,
}

/// In-memory transport that records requests and replays scripted responses.
#[derive(Default)]
pub struct FakeTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<HttpResponse>>,
    streams: Mutex<VecDeque<StreamScript>>,
    stream_opens: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, body: &str) {
        self.responses.lock().unwrap().push_back(HttpResponse {
            status,
            body: Bytes::from(body.to_string()),
        });
    }

    pub fn script_stream(&self, script: StreamScript) {
        self.streams.lock().unwrap().push_back(script);
    }

    /// Script a live stream and return the sender feeding its body.
    pub fn live_stream(&self) -> mpsc::UnboundedSender<Result<Bytes, GitterError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script_stream(StreamScript::Live(rx));
        tx
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request recorded")
    }

    pub fn stream_opens(&self) -> Vec<HttpRequest> {
        self.stream_opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GitterError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GitterError::Transport("connection refused".to_string()))
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamResponse, GitterError> {
        self.stream_opens.lock().unwrap().push(request);
        let script = self.streams.lock().unwrap().pop_front();
        match script {
            Some(StreamScript::Live(rx)) => {
                let body = futures_util::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed();
                Ok(StreamResponse { status: 200, body })
            }
            Some(StreamScript::Fixed(chunks)) => {
                let body = futures_util::stream::iter(
                    chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))),
                )
                .boxed();
                Ok(StreamResponse { status: 200, body })
            }
            Some(StreamScript::Reject(status, body)) => Ok(StreamResponse {
                status,
                body: futures_util::stream::iter(vec![Ok(Bytes::from_static(body.as_bytes()))])
                    .boxed(),
            }),
            Some(StreamScript::Fail(reason)) => Err(GitterError::Transport(reason.to_string())),
            Some(StreamScript::Stall) => futures_util::future::pending().await,
            // Nothing scripted: an idle connection that never delivers.
            None => Ok(StreamResponse {
                status: 200,
                body: futures_util::stream::pending().boxed(),
            }),
        }
    }
}

pub fn test_config() -> Config {
    Config::default()
        .api_url("https://api.test/v1")
        .stream_url("https://stream.test/v1")
        .reconnect(ReconnectPolicy {
            max_attempts: 2,
            initial_delay_ms: 100,
            max_delay_ms: 100,
        })
}

pub fn client_with(transport: &Arc<FakeTransport>) -> GitterClient {
    let transport: Arc<dyn Transport> = transport.clone();
    GitterClient::with_transport(test_config(), transport)
}
