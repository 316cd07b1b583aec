use std::thread;
use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot};
use shared::types::{EndpointKey, WatchKey};
use crate::store::document::{ConfigDocument, ServerConfig};
use crate::store::validate::ServerDraft;
use crate::store::{Store, StoreError};

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

/// Commands sent to the store thread
pub enum StoreCommand {
    Snapshot(oneshot::Sender<ConfigDocument>),
    AddServer(ServerDraft, Reply<EndpointKey>),
    RemoveServer(EndpointKey, Reply<ServerConfig>),
    CheckWatch(Vec<EndpointKey>, Reply<Vec<EndpointKey>>),
    AddWatch(WatchKey, Vec<EndpointKey>, Reply<()>),
    RemoveWatch(WatchKey, Reply<()>),
    RemoveWatches(Vec<WatchKey>, Reply<usize>),
    Shutdown(oneshot::Sender<Result<()>>),
}

/// Handle to the configuration store. File writes happen on a dedicated
/// thread so they never block the runtime.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn a new store thread owning `store`
    pub fn spawn(mut store: Store) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(64);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::Snapshot(reply) => {
                        let _ = reply.send(store.document().clone());
                    }
                    StoreCommand::AddServer(draft, reply) => {
                        let _ = reply.send(store.add_server(&draft));
                    }
                    StoreCommand::RemoveServer(key, reply) => {
                        let _ = reply.send(store.remove_server(&key));
                    }
                    StoreCommand::CheckWatch(servers, reply) => {
                        let _ = reply.send(store.check_watch_servers(&servers));
                    }
                    StoreCommand::AddWatch(key, servers, reply) => {
                        let _ = reply.send(store.add_watch(key, &servers));
                    }
                    StoreCommand::RemoveWatch(key, reply) => {
                        let _ = reply.send(store.remove_watch(&key));
                    }
                    StoreCommand::RemoveWatches(keys, reply) => {
                        let _ = reply.send(store.remove_watches(&keys));
                    }
                    StoreCommand::Shutdown(reply) => {
                        let flushed = store.flush();
                        if let Err(e) = &flushed {
                            tracing::error!("Final config flush failed: {:#}", e);
                        }
                        tracing::info!("Store thread shutting down");
                        let _ = reply.send(flushed);
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> StoreCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| anyhow!("Store thread is not running"))?;
        rx.await.context("Store thread dropped the request")
    }

    /// Copy of the current document
    pub async fn snapshot(&self) -> Result<ConfigDocument> {
        self.request(StoreCommand::Snapshot).await
    }

    pub async fn add_server(&self, draft: ServerDraft) -> Result<EndpointKey, StoreError> {
        self.request(|reply| StoreCommand::AddServer(draft, reply)).await?
    }

    pub async fn remove_server(&self, key: EndpointKey) -> Result<ServerConfig, StoreError> {
        self.request(|reply| StoreCommand::RemoveServer(key, reply)).await?
    }

    /// Validate a selection for a watch group; returns it deduplicated
    pub async fn check_watch(&self, servers: Vec<EndpointKey>) -> Result<Vec<EndpointKey>, StoreError> {
        self.request(|reply| StoreCommand::CheckWatch(servers, reply)).await?
    }

    pub async fn add_watch(&self, key: WatchKey, servers: Vec<EndpointKey>) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::AddWatch(key, servers, reply)).await?
    }

    pub async fn remove_watch(&self, key: WatchKey) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::RemoveWatch(key, reply)).await?
    }

    /// Remove several watch groups with a single document rewrite
    pub async fn remove_watches(&self, keys: Vec<WatchKey>) -> Result<usize, StoreError> {
        self.request(|reply| StoreCommand::RemoveWatches(keys, reply)).await?
    }

    /// Flush and stop the store thread. Returns once the final write
    /// has finished.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(StoreCommand::Shutdown).await?
    }
}
