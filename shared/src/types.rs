use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identity of a monitored game server. Serialized as `"address:port"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub address: IpAddr,
    pub port: u16,
}

impl EndpointKey {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Error returned when a composite key string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParseError(pub String);

impl fmt::Display for KeyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed key: {}", self.0)
    }
}

impl std::error::Error for KeyParseError {}

impl FromStr for EndpointKey {
    type Err = KeyParseError;

    // The port is always the last segment, so IPv6 literals keep their colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, port) = s
            .rsplit_once(':')
            .ok_or_else(|| KeyParseError(s.to_string()))?;
        let address = address
            .parse::<IpAddr>()
            .map_err(|_| KeyParseError(s.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| KeyParseError(s.to_string()))?;
        Ok(Self { address, port })
    }
}

/// Identity of a status display: the channel it lives in and its message id.
/// Serialized as `"channel_id:message_id"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey {
    pub channel_id: u64,
    pub message_id: u64,
}

impl WatchKey {
    pub fn new(channel_id: u64, message_id: u64) -> Self {
        Self { channel_id, message_id }
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.message_id)
    }
}

impl FromStr for WatchKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (channel_id, message_id) = s
            .split_once(':')
            .ok_or_else(|| KeyParseError(s.to_string()))?;
        let channel_id = channel_id
            .parse()
            .map_err(|_| KeyParseError(s.to_string()))?;
        let message_id = message_id
            .parse()
            .map_err(|_| KeyParseError(s.to_string()))?;
        Ok(Self { channel_id, message_id })
    }
}

macro_rules! string_key_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_key_serde!(EndpointKey);
string_key_serde!(WatchKey);

/// A successful answer from a game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_name: String,
    pub player_count: u32,
    pub max_players: u32,
    pub map_name: String,
}

/// Latest query result for one endpoint.
///
/// `Unknown` covers both "never queried" and "the last query failed";
/// a failure never falls back to older data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    #[default]
    Unknown,
    Observed(ServerInfo),
}

impl Status {
    /// Server info usable for display. An observed server without a name is
    /// treated as offline.
    pub fn online(&self) -> Option<&ServerInfo> {
        match self {
            Status::Observed(info) if !info.server_name.is_empty() => Some(info),
            _ => None,
        }
    }
}

/// Structured display content, shaped like a chat embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Status of one endpoint as published after a poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub server: EndpointKey,
    pub status: Status,
}

/// Result of the most recent poll, published to API readers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollSnapshot {
    /// When the poll finished; `None` until the first cycle completes
    pub polled_at: Option<DateTime<Utc>>,

    /// Wall-clock duration of the whole batch
    pub elapsed_secs: f64,

    pub statuses: Vec<EndpointStatus>,
}
