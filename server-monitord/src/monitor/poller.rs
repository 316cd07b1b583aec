use std::collections::HashMap;
use std::time::Duration;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use tokio::time::Instant;
use shared::types::{EndpointKey, EndpointStatus, PollSnapshot, Status};
use crate::query::{QueryError, ServerQuery};
use crate::store::document::ServerConfig;

/// Last observed status per endpoint, for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    statuses: HashMap<EndpointKey, Status>,
}

impl StatusCache {
    pub fn get(&self, key: &EndpointKey) -> Option<&Status> {
        self.statuses.get(key)
    }

    pub fn set(&mut self, key: EndpointKey, status: Status) {
        self.statuses.insert(key, status);
    }

    /// Statuses of the registered servers, in registry order
    pub fn snapshot(
        &self,
        registry: &IndexMap<EndpointKey, ServerConfig>,
        polled_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> PollSnapshot {
        PollSnapshot {
            polled_at: Some(polled_at),
            elapsed_secs: elapsed.as_secs_f64(),
            statuses: registry
                .keys()
                .map(|key| EndpointStatus {
                    server: *key,
                    status: self.get(key).cloned().unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Budget for each query
    pub timeout: Duration,
    /// Queries in flight at once
    pub concurrency: usize,
}

/// Query every registered server and overwrite its cached status.
///
/// Failures and timeouts reset the server to `Status::Unknown`. Returns once
/// every query has finished, with the wall-clock time the batch took.
pub async fn poll_all<Q>(
    query: &Q,
    servers: &IndexMap<EndpointKey, ServerConfig>,
    statuses: &mut StatusCache,
    settings: &PollSettings,
) -> Duration
where
    Q: ServerQuery + ?Sized,
{
    let started = Instant::now();

    // Owned jobs keep the query futures free of borrows into the registry
    let jobs: Vec<(EndpointKey, String)> = servers
        .iter()
        .map(|(key, server)| (*key, server.name.clone()))
        .collect();

    let timeout = settings.timeout;
    let results: Vec<(EndpointKey, Status)> = stream::iter(
        jobs.into_iter()
            .map(move |(key, name)| query_one(query, key, name, timeout)),
    )
    .buffer_unordered(settings.concurrency.max(1))
    .collect()
    .await;

    let elapsed = started.elapsed();

    statuses.statuses.retain(|key, _| servers.contains_key(key));
    for (key, status) in results {
        statuses.set(key, status);
    }

    elapsed
}

async fn query_one<Q>(query: &Q, key: EndpointKey, name: String, timeout: Duration) -> (EndpointKey, Status)
where
    Q: ServerQuery + ?Sized,
{
    let status = match tokio::time::timeout(timeout, query.query(key.socket_addr())).await {
        Ok(Ok(info)) => Status::Observed(info),
        Ok(Err(QueryError::Timeout)) | Err(_) => {
            tracing::warn!("Query timeout on server {} [{}]", key, name);
            Status::Unknown
        }
        Ok(Err(e)) => {
            tracing::warn!("Query error on server {} [{}]: {}", key, name, e);
            Status::Unknown
        }
    };

    (key, status)
}
