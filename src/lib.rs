//! Client SDK for the Gitter chat API: rooms, messages and realtime message
//! streams.

mod client;
pub mod config;
mod error;
mod http;
mod models;
mod stream;
mod subscription;
mod transport;

pub use client::{GitterApi, GitterClient};
pub use config::Config;
pub use error::GitterError;
pub use http::HttpClient;
pub use models::{IssueRef, Mention, Message, MessageRequest, Room, UrlRef, User};
pub use subscription::{RealtimeMessages, ReconnectPolicy, SessionState, Subscription};
pub use transport::{
    ByteStream, HttpRequest, HttpResponse, ReqwestTransport, StreamResponse, Transport,
};
