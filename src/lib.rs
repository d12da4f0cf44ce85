pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod shell;

pub use crate::config::ClientConfig;
pub use crate::error::{ErrorKind, TransportError, WorkflowError};
pub use crate::models::{Policy, Provider, SelectedFile};
pub use crate::services::coordinator::{Coordinator, UploadOutcome};
pub use crate::services::session::{ResultSlot, Session, UploadPath, WorkflowState};
pub use crate::services::transport::{
    HttpTransport, RequestBody, Target, Transport, TransportRequest, TransportResponse,
};
pub use crate::services::worker::CoordinatorHandle;
