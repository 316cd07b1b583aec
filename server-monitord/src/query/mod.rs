//! Game-server query collaborator.

pub mod a2s;

use std::net::SocketAddr;
use async_trait::async_trait;
use shared::types::ServerInfo;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Asks a single game server for its current info.
///
/// Implementations may time out on their own; callers additionally bound
/// every call with their own budget.
#[async_trait]
pub trait ServerQuery: Send + Sync {
    async fn query(&self, addr: SocketAddr) -> Result<ServerInfo, QueryError>;
}
