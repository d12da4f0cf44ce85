use crate::config::ClientConfig;
use crate::error::WorkflowError;
use crate::models::{Policy, Provider, SelectedFile, StorageAnalysis, UploadReceipt};
use crate::services::session::{Session, UploadPath, WorkflowState};
use crate::services::transport::Transport;
use crate::services::{analysis, backend, direct_upload, presigned_upload};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// What either upload path leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub path: UploadPath,
    pub request_id: String,
    /// Set only by the presigned path
    pub storage_key: Option<String>,
    /// Where the direct path stored the file, when the backend says
    pub stored_at: Option<String>,
    /// Analysis performed as part of the upload (presigned path only)
    pub analysis: Option<Value>,
}

impl From<UploadReceipt> for UploadOutcome {
    fn from(receipt: UploadReceipt) -> Self {
        Self {
            path: UploadPath::Direct,
            request_id: receipt.request_id,
            storage_key: None,
            stored_at: receipt.s3_uri,
            analysis: None,
        }
    }
}

/// Owns the session and sequences the user-triggered actions over it.
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    session: Session,
}

impl Coordinator {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let session = Session::new(config.default_policy);
        Self {
            transport,
            config,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> WorkflowState {
        self.session.state()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn select_file(&mut self, file: SelectedFile) {
        info!("🖼️  Selected {} ({} bytes)", file.name, file.len());
        self.session.select_file(file);
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.session.set_policy(policy);
    }

    pub async fn upload(&mut self, path: UploadPath) -> Result<UploadOutcome, WorkflowError> {
        match path {
            UploadPath::Direct => self.upload_direct().await.map(UploadOutcome::from),
            UploadPath::Presigned => {
                let analysis = self.upload_presigned().await?;
                Ok(UploadOutcome {
                    path,
                    request_id: analysis.request_id,
                    storage_key: self.session.storage_key().map(str::to_string),
                    stored_at: None,
                    analysis: Some(analysis.payload),
                })
            }
        }
    }

    pub async fn upload_direct(&mut self) -> Result<UploadReceipt, WorkflowError> {
        direct_upload::upload_direct(self.transport.as_ref(), &mut self.session).await
    }

    pub async fn upload_presigned(&mut self) -> Result<StorageAnalysis, WorkflowError> {
        presigned_upload::upload_presigned(self.transport.as_ref(), &mut self.session).await
    }

    pub async fn analyze(&mut self, provider: Provider) -> Result<Value, WorkflowError> {
        analysis::analyze(
            self.transport.as_ref(),
            &mut self.session,
            provider,
            &self.config.model_preset,
        )
        .await
    }

    pub async fn route(&mut self) -> Result<Value, WorkflowError> {
        analysis::route(self.transport.as_ref(), &mut self.session).await
    }

    pub async fn health(&self) -> Result<Value, WorkflowError> {
        backend::health(self.transport.as_ref()).await
    }

    /// Looks up a stored record; defaults to the session's request id.
    pub async fn lookup_result(&self, request_id: Option<&str>) -> Result<Value, WorkflowError> {
        let request_id = request_id
            .or_else(|| self.session.request_id())
            .ok_or(WorkflowError::MissingRequestId)?;
        backend::lookup_result(self.transport.as_ref(), request_id).await
    }
}
