use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::GitterError;
use crate::http::{HttpClient, TokenStore};
use crate::models::{Message, MessageRequest, Room, User};
use crate::subscription::{RealtimeMessages, ReconnectPolicy};
use crate::transport::{ReqwestTransport, Transport};

/// Operations offered by the Gitter API.
///
/// [`GitterClient`] is the network-backed implementation; code that only needs
/// these operations can depend on the trait and be tested with a double.
#[async_trait]
pub trait GitterApi: Send + Sync {
    /// Set the bearer token used by every later request. No network call is made;
    /// the last call wins.
    fn try_authenticate(&self, token: &str);

    /// The user the token belongs to.
    async fn get_current_user(&self) -> Result<User, GitterError>;

    /// Mark messages of a room as read by a user.
    async fn read_chat_messages(
        &self,
        user_id: &str,
        room_id: &str,
        message_ids: &[String],
    ) -> Result<(), GitterError>;

    /// Rooms of the current user.
    async fn get_rooms(&self) -> Result<Vec<Room>, GitterError>;

    /// Join the room at `uri`, or fetch it when already a member.
    async fn join_room(&self, uri: &str) -> Result<Room, GitterError>;

    /// Cold sequence of new messages posted to a room.
    fn get_realtime_messages(&self, room_id: &str) -> RealtimeMessages;

    async fn get_room_messages(
        &self,
        room_id: &str,
        limit: u32,
        before_id: Option<&str>,
        after_id: Option<&str>,
        skip: u32,
    ) -> Result<Vec<Message>, GitterError>;

    /// Fetch messages with every option of [`MessageRequest`].
    async fn get_room_messages_with(
        &self,
        room_id: &str,
        request: &MessageRequest,
    ) -> Result<Vec<Message>, GitterError>;

    /// Full-text search within a room.
    async fn search_room_messages(
        &self,
        room_id: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Message>, GitterError> {
        let request = MessageRequest::new().query(query).limit(limit);
        self.get_room_messages_with(room_id, &request).await
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<Message, GitterError>;

    async fn update_message(
        &self,
        room_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<Message, GitterError>;
}

#[derive(Serialize)]
struct TextBody<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct JoinRoomBody<'a> {
    uri: &'a str,
}

#[derive(Serialize)]
struct UnreadItemsBody<'a> {
    chat: &'a [String],
}

fn enc(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Client for the Gitter REST and streaming API.
#[derive(Clone)]
pub struct GitterClient {
    http: HttpClient,
    transport: Arc<dyn Transport>,
    token: TokenStore,
    stream_url: String,
    keepalive: char,
    reconnect: ReconnectPolicy,
}

impl GitterClient {
    /// Create a client with the default configuration.
    pub fn new() -> Result<Self, GitterError> {
        Self::with_config(Config::default())
    }

    /// Create a client backed by reqwest.
    pub fn with_config(config: Config) -> Result<Self, GitterError> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over any [`Transport`].
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let token = TokenStore::default();
        let http = HttpClient::new(Arc::clone(&transport), &config.api_url, token.clone());
        Self {
            http,
            transport,
            token,
            stream_url: config.stream_url.trim_end_matches('/').to_string(),
            keepalive: config.keepalive,
            reconnect: config.reconnect,
        }
    }

    /// The underlying request/response adapter.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.get().is_some()
    }
}

#[async_trait]
impl GitterApi for GitterClient {
    fn try_authenticate(&self, token: &str) {
        self.token.set(token);
    }

    async fn get_current_user(&self) -> Result<User, GitterError> {
        let users: Vec<User> = self.http.get_json("user", &[]).await?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| GitterError::Decode("current user list is empty".to_string()))
    }

    async fn read_chat_messages(
        &self,
        user_id: &str,
        room_id: &str,
        message_ids: &[String],
    ) -> Result<(), GitterError> {
        let path = format!("user/{}/rooms/{}/unreadItems", enc(user_id), enc(room_id));
        self.http
            .post(&path, &UnreadItemsBody { chat: message_ids })
            .await?;
        Ok(())
    }

    async fn get_rooms(&self) -> Result<Vec<Room>, GitterError> {
        self.http.get_json("rooms", &[]).await
    }

    async fn join_room(&self, uri: &str) -> Result<Room, GitterError> {
        self.http.post_json("rooms", &JoinRoomBody { uri }).await
    }

    fn get_realtime_messages(&self, room_id: &str) -> RealtimeMessages {
        RealtimeMessages::new(
            Arc::clone(&self.transport),
            &self.stream_url,
            room_id,
            self.token.clone(),
            self.keepalive,
            self.reconnect.clone(),
        )
    }

    async fn get_room_messages(
        &self,
        room_id: &str,
        limit: u32,
        before_id: Option<&str>,
        after_id: Option<&str>,
        skip: u32,
    ) -> Result<Vec<Message>, GitterError> {
        let request = MessageRequest {
            limit,
            before_id: before_id.map(str::to_string),
            after_id: after_id.map(str::to_string),
            skip,
            ..MessageRequest::default()
        };
        self.get_room_messages_with(room_id, &request).await
    }

    async fn get_room_messages_with(
        &self,
        room_id: &str,
        request: &MessageRequest,
    ) -> Result<Vec<Message>, GitterError> {
        let path = format!("rooms/{}/chatMessages", enc(room_id));
        self.http.get_json(&path, &request.to_query()).await
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<Message, GitterError> {
        let path = format!("rooms/{}/chatMessages", enc(room_id));
        self.http.post_json(&path, &TextBody { text }).await
    }

    async fn update_message(
        &self,
        room_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<Message, GitterError> {
        let path = format!("rooms/{}/chatMessages/{}", enc(room_id), enc(message_id));
        self.http.put_json(&path, &TextBody { text }).await
    }
}
