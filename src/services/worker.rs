use crate::error::WorkflowError;
use crate::models::{Policy, Provider, SelectedFile};
use crate::services::coordinator::{Coordinator, UploadOutcome};
use crate::services::session::{Session, UploadPath};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T, WorkflowError>>;

enum Command {
    SelectFile {
        file: SelectedFile,
        resp: oneshot::Sender<()>,
    },
    SetPolicy {
        policy: Policy,
        resp: oneshot::Sender<()>,
    },
    Upload {
        path: UploadPath,
        resp: Reply<UploadOutcome>,
    },
    Analyze {
        provider: Provider,
        resp: Reply<Value>,
    },
    Route {
        resp: Reply<Value>,
    },
    Health {
        resp: Reply<Value>,
    },
    Lookup {
        request_id: Option<String>,
        resp: Reply<Value>,
    },
    Snapshot {
        resp: oneshot::Sender<Session>,
    },
}

/// Single task owning the coordinator; commands run one at a time in arrival order.
pub struct SessionWorker {
    coordinator: Coordinator,
    commands: mpsc::Receiver<Command>,
}

impl SessionWorker {
    pub async fn run(mut self) {
        tracing::info!("🚀 Session worker started");

        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
        }

        tracing::info!("🛑 Session worker shutting down");
    }

    async fn handle(&mut self, command: Command) {
        let coordinator = &mut self.coordinator;
        // A dropped reply receiver means the caller stopped waiting; the
        // session change still stands.
        match command {
            Command::SelectFile { file, resp } => {
                coordinator.select_file(file);
                let _ = resp.send(());
            }
            Command::SetPolicy { policy, resp } => {
                coordinator.set_policy(policy);
                let _ = resp.send(());
            }
            Command::Upload { path, resp } => {
                let _ = resp.send(coordinator.upload(path).await);
            }
            Command::Analyze { provider, resp } => {
                let _ = resp.send(coordinator.analyze(provider).await);
            }
            Command::Route { resp } => {
                let _ = resp.send(coordinator.route().await);
            }
            Command::Health { resp } => {
                let _ = resp.send(coordinator.health().await);
            }
            Command::Lookup { request_id, resp } => {
                let _ = resp.send(coordinator.lookup_result(request_id.as_deref()).await);
            }
            Command::Snapshot { resp } => {
                let _ = resp.send(coordinator.session().clone());
            }
        }
    }
}

/// Cloneable front end to a [`SessionWorker`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Moves the coordinator into its own task and returns a handle to it.
    pub fn spawn(coordinator: Coordinator) -> Self {
        let (handle, worker) = Self::new(coordinator);
        tokio::spawn(worker.run());
        handle
    }

    pub fn new(coordinator: Coordinator) -> (Self, SessionWorker) {
        let (tx, rx) = mpsc::channel(32);
        (
            Self { tx },
            SessionWorker {
                coordinator,
                commands: rx,
            },
        )
    }

    async fn request<T>(
        &self,
        command: Command,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, WorkflowError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| WorkflowError::CoordinatorStopped)?;
        rx.await.map_err(|_| WorkflowError::CoordinatorStopped)
    }

    pub async fn select_file(&self, file: SelectedFile) -> Result<(), WorkflowError> {
        let (resp, rx) = oneshot::channel();
        self.request(Command::SelectFile { file, resp }, rx).await
    }

    pub async fn set_policy(&self, policy: Policy) -> Result<(), WorkflowError> {
        let (resp, rx) = oneshot::channel();
        self.request(Command::SetPolicy { policy, resp }, rx).await
    }

    pub async fn upload(&self, path: UploadPath) -> Result<UploadOutcome, WorkflowError> {
        let (resp, rx) = oneshot::channel();
        self.request(Command::Upload { path, resp }, rx).await?
    }

    pub async fn analyze(&self, provider: Provider) -> Result<Value, WorkflowError> {
        let (resp, rx) = oneshot::channel();
        self.request(Command::Analyze { provider, resp }, rx).await?
    }

    pub async fn route(&self) -> Result<Value, WorkflowError> {
        let (resp, rx) = oneshot::channel();
        self.request(Command::Route { resp }, rx).await?
    }

    pub async fn health(&self) -> Result<Value, WorkflowError> {
        let (resp, rx) = oneshot::channel();
        self.request(Command::Health { resp }, rx).await?
    }

    pub async fn lookup_result(&self, request_id: Option<String>) -> Result<Value, WorkflowError> {
        let (resp, rx) = oneshot::channel();
        self.request(Command::Lookup { request_id, resp }, rx).await?
    }

    /// Copy of the session as of the moment the worker reaches this request.
    pub async fn snapshot(&self) -> Result<Session, WorkflowError> {
        let (resp, rx) = oneshot::channel();
        self.request(Command::Snapshot { resp }, rx).await
    }
}
