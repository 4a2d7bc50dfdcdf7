use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

const DEFAULT_MESSAGE_LIMIT: u32 = 50;

/// The service sends `null` for empty fields as often as it omits them.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A Gitter user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub avatar_url_small: Option<String>,
    #[serde(default)]
    pub avatar_url_medium: Option<String>,
    #[serde(default)]
    pub v: Option<u64>,
}

/// A chat room the current user can see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub one_to_one: bool,
    /// The other participant of a one-to-one room.
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unread_items: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mentions: u32,
    #[serde(default)]
    pub last_access_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub favourite: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lurk: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub github_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub v: Option<u64>,
}

/// A user mentioned in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    #[serde(default, deserialize_with = "null_as_default")]
    pub screen_name: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_ids: Vec<String>,
}

/// A GitHub issue referenced in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRef {
    pub url: String,
}

/// A chat message as stored by the service.
///
/// Messages are only ever received: sending or editing returns the server's
/// canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub sent: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub from_user: Option<User>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unread: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub read_by: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub urls: Vec<UrlRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mentions: Vec<Mention>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issues: Vec<IssueRef>,
    #[serde(default)]
    pub v: Option<u64>,
}

impl Message {
    /// Whether the message was edited after being sent.
    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }
}

/// Query options for listing the messages of a room.
///
/// `before_id`, `after_id` and `around_id` are alternative anchors; the service
/// honours at most one of them, and whatever is set is passed through as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRequest {
    pub limit: u32,
    pub before_id: Option<String>,
    pub after_id: Option<String>,
    pub around_id: Option<String>,
    pub skip: u32,
    pub query: Option<String>,
}

impl Default for MessageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_MESSAGE_LIMIT,
            before_id: None,
            after_id: None,
            around_id: None,
            skip: 0,
            query: None,
        }
    }
}

impl MessageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn before(mut self, message_id: &str) -> Self {
        self.before_id = Some(message_id.to_string());
        self
    }

    pub fn after(mut self, message_id: &str) -> Self {
        self.after_id = Some(message_id.to_string());
        self
    }

    pub fn around(mut self, message_id: &str) -> Self {
        self.around_id = Some(message_id.to_string());
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    pub fn query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    /// Query parameters for this request. `limit` is always present, `skip` only
    /// when non-zero, and optional fields only when set.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("limit", self.limit.to_string())];
        if let Some(id) = &self.before_id {
            params.push(("beforeId", id.clone()));
        }
        if let Some(id) = &self.after_id {
            params.push(("afterId", id.clone()));
        }
        if let Some(id) = &self.around_id {
            params.push(("aroundId", id.clone()));
        }
        if self.skip > 0 {
            params.push(("skip", self.skip.to_string()));
        }
        if let Some(q) = &self.query {
            params.push(("q", q.clone()));
        }
        params
    }
}
