//! Runs an `OfflineWorker` as its own task and talks to it over channels.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{WorkerEvent, WorkerMessage, WorkerReply};
use super::service::{OfflineWorker, SyncReport, WorkerError, WorkerState};
use crate::api::{FetchError, RequestOptions, Response, Transport};

/// Command channel depth
const COMMAND_BUFFER: usize = 32;

enum Command {
    Message {
        message: WorkerMessage,
        reply: oneshot::Sender<WorkerReply>,
    },
    Fetch {
        url: String,
        options: RequestOptions,
        reply: oneshot::Sender<Result<Response, FetchError>>,
    },
    Sync {
        reply: oneshot::Sender<SyncReport>,
    },
    ReleaseClient {
        reply: oneshot::Sender<WorkerState>,
    },
    Shutdown,
}

/// Client side of a running worker
pub struct WorkerHandle {
    commands: mpsc::Sender<Command>,
    worker: Arc<OfflineWorker>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Start the worker task: install, activate when nothing holds it back,
    /// then serve commands until shut down.
    pub fn spawn(worker: OfflineWorker) -> Self {
        let worker = Arc::new(worker);
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(Arc::clone(&worker), rx));
        Self {
            commands,
            worker,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn version(&self) -> &str {
        self.worker.version()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.worker.subscribe()
    }

    pub fn worker(&self) -> &Arc<OfflineWorker> {
        &self.worker
    }

    pub async fn post(&self, message: WorkerMessage) -> Result<WorkerReply, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Message { message, reply })
            .await
            .map_err(|_| WorkerError::Stopped)?;
        rx.await.map_err(|_| WorkerError::Stopped)
    }

    pub async fn fetch(&self, url: &str, options: RequestOptions) -> Result<Response, FetchError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Fetch {
            url: url.to_string(),
            options,
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return Err(FetchError::Aborted);
        }
        rx.await.unwrap_or(Err(FetchError::Aborted))
    }

    pub async fn sync(&self) -> Result<SyncReport, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Sync { reply })
            .await
            .map_err(|_| WorkerError::Stopped)?;
        rx.await.map_err(|_| WorkerError::Stopped)
    }

    /// A client held by the previous version has closed. The installed
    /// worker activates once none are left. Returns the resulting state.
    pub async fn release_client(&self) -> Result<WorkerState, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::ReleaseClient { reply })
            .await
            .map_err(|_| WorkerError::Stopped)?;
        rx.await.map_err(|_| WorkerError::Stopped)
    }

    /// Stop the command loop and wait for it to finish
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
    }
}

async fn run(worker: Arc<OfflineWorker>, mut commands: mpsc::Receiver<Command>) {
    if worker.install().await.is_ok() {
        try_activate(&worker);
    }

    while let Some(command) = commands.recv().await {
        match command {
            Command::Message { message, reply } => {
                let skip = message == WorkerMessage::SkipWaiting;
                let answer = worker.handle_message(message).await;
                if skip {
                    try_activate(&worker);
                }
                let _ = reply.send(answer);
            }
            Command::Fetch { url, options, reply } => {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move {
                    let _ = reply.send(worker.fetch(&url, &options).await);
                });
            }
            Command::Sync { reply } => {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move {
                    let _ = reply.send(worker.sync().await);
                });
            }
            Command::ReleaseClient { reply } => {
                worker.remove_client();
                try_activate(&worker);
                let _ = reply.send(worker.state());
            }
            Command::Shutdown => break,
        }
    }
    info!(version = %worker.version(), "Offline worker stopped");
}

/// Page traffic goes through the worker, which may answer from its caches
#[async_trait]
impl Transport for WorkerHandle {
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<Response, FetchError> {
        self.fetch(url, options.clone()).await
    }
}

fn try_activate(worker: &OfflineWorker) {
    if worker.state() != WorkerState::Installed {
        return;
    }
    if worker.is_waiting() {
        debug!(version = %worker.version(), "Worker installed, waiting for clients to release");
        return;
    }
    if let Err(e) = worker.activate() {
        warn!(error = %e, "Worker activation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Method, OfflineQueue};
    use crate::testing::ScriptedTransport;
    use crate::worker::WorkerConfig;

    fn worker(transport: &Arc<ScriptedTransport>) -> OfflineWorker {
        let config = WorkerConfig {
            static_manifest: vec!["/".into(), "/offline/".into()],
            ..WorkerConfig::default()
        };
        OfflineWorker::new(config, transport.clone(), Arc::new(OfflineQueue::in_memory()))
    }

    fn spawn(transport: &Arc<ScriptedTransport>) -> (WorkerHandle, broadcast::Receiver<WorkerEvent>) {
        let worker = worker(transport);
        let events = worker.subscribe();
        (WorkerHandle::spawn(worker), events)
    }

    #[tokio::test]
    async fn test_spawn_installs_and_activates() {
        let transport = Arc::new(ScriptedTransport::new());
        let (handle, mut events) = spawn(&transport);

        assert_eq!(
            events.recv().await.unwrap(),
            WorkerEvent::Activated {
                version: "v1".into()
            }
        );
        assert_eq!(handle.state(), WorkerState::Activated);
        assert_eq!(
            handle.post(WorkerMessage::GetCacheSize).await.unwrap(),
            WorkerReply::CacheSize { size: 2 }
        );
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_fail() {
        let transport = Arc::new(ScriptedTransport::new());
        let (handle, _events) = spawn(&transport);
        handle.shutdown().await;

        assert_eq!(handle.post(WorkerMessage::ClearCache).await, Err(WorkerError::Stopped));
        assert_eq!(handle.fetch("/dashboard/", RequestOptions::get()).await, Err(FetchError::Aborted));
    }

    #[tokio::test]
    async fn test_sync_through_handle() {
        let transport = Arc::new(ScriptedTransport::new());
        let (handle, _events) = spawn(&transport);
        let id = handle
            .worker()
            .queue()
            .enqueue("/api/budgets/create/", RequestOptions::new(Method::Post));

        let report = handle.sync().await.unwrap();
        assert_eq!(report.replayed, vec![id]);
        assert_eq!(transport.methods_for("/api/budgets/create/"), vec![Method::Post]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_waits_until_old_clients_release() {
        let transport = Arc::new(ScriptedTransport::new());
        let worker = worker(&transport);
        worker.add_client();
        worker.add_client();
        let handle = WorkerHandle::spawn(worker);

        // Answered after install
        handle.post(WorkerMessage::GetCacheSize).await.unwrap();
        assert_eq!(handle.state(), WorkerState::Installed);
        assert!(handle.worker().is_waiting());

        assert_eq!(handle.release_client().await.unwrap(), WorkerState::Installed);
        assert_eq!(handle.release_client().await.unwrap(), WorkerState::Activated);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_skip_waiting_activates_immediately() {
        let transport = Arc::new(ScriptedTransport::new());
        let worker = worker(&transport);
        worker.add_client();
        let handle = WorkerHandle::spawn(worker);

        assert_eq!(handle.post(WorkerMessage::SkipWaiting).await.unwrap(), WorkerReply::Ack);
        assert_eq!(handle.state(), WorkerState::Activated);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_transport_answers_from_worker_cache() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/offline/", Ok(Response::html(200, "<main>Offline</main>")));
        transport.push("/offline/", Err(FetchError::Network("down".into())));
        let (handle, _events) = spawn(&transport);

        let response = Transport::send(&handle, "/offline/", &RequestOptions::get()).await.unwrap();
        assert_eq!(response.body, "<main>Offline</main>");
        handle.shutdown().await;
    }
}
