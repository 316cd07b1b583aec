use std::io::ErrorKind;
use std::net::SocketAddr;
use async_trait::async_trait;
use ::a2s::A2SClient;
use shared::types::ServerInfo;
use super::{QueryError, ServerQuery};

/// Source engine A2S_INFO queries over UDP.
///
/// The client is blocking, so each query runs on the blocking pool. Its
/// socket carries its own read timeout, which surfaces as `QueryError::Timeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct A2sQuery;

#[async_trait]
impl ServerQuery for A2sQuery {
    async fn query(&self, addr: SocketAddr) -> Result<ServerInfo, QueryError> {
        let info = tokio::task::spawn_blocking(move || {
            let client = A2SClient::new()?;
            client.info(addr)
        })
        .await
        .map_err(|e| QueryError::Malformed(format!("query task failed: {}", e)))?
        .map_err(classify)?;

        Ok(ServerInfo {
            server_name: info.name,
            player_count: info.players.into(),
            max_players: info.max_players.into(),
            map_name: info.map,
        })
    }
}

fn classify(error: ::a2s::errors::Error) -> QueryError {
    match error {
        ::a2s::errors::Error::Io(ref io)
            if matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) =>
        {
            QueryError::Timeout
        }
        other => QueryError::Malformed(other.to_string()),
    }
}
