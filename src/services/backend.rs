use crate::error::WorkflowError;
use crate::services::transport::{Target, Transport, TransportRequest};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::Value;
use tracing::{error, info};

pub const HEALTH_PATH: &str = "/healthz";
pub const RESULT_PATH: &str = "/api/result";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'\\');

/// `GET /healthz`; the backend reports whether it runs real providers or mocks.
pub async fn health(transport: &dyn Transport) -> Result<Value, WorkflowError> {
    let status = transport
        .send(TransportRequest::get(Target::backend(HEALTH_PATH)))
        .await
        .and_then(|response| response.json())
        .map_err(|e| {
            error!("❌ Health check failed: {}", e);
            WorkflowError::HealthCheckFailed(e)
        })?;

    info!("💓 Backend health: {}", status);
    Ok(status)
}

/// Fetches the stored analysis record for a request id.
pub async fn lookup_result(
    transport: &dyn Transport,
    request_id: &str,
) -> Result<Value, WorkflowError> {
    let request_id = request_id.trim();
    if request_id.is_empty() {
        return Err(WorkflowError::MissingRequestId);
    }
    // Dot segments survive percent-encoding and would be normalized away.
    if request_id == "." || request_id == ".." {
        return Err(WorkflowError::InvalidRequestId(request_id.to_string()));
    }

    let segment = utf8_percent_encode(request_id, PATH_SEGMENT);
    let path = format!("{}/{}", RESULT_PATH, segment);
    transport
        .send(TransportRequest::get(Target::backend(path)))
        .await
        .and_then(|response| response.json())
        .map_err(|e| {
            error!("❌ Result lookup failed for {}: {}", request_id, e);
            WorkflowError::LookupFailed(e)
        })
}
