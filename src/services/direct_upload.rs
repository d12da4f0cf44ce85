use crate::error::WorkflowError;
use crate::models::UploadReceipt;
use crate::services::session::{Session, UploadPath};
use crate::services::transport::{Target, Transport, TransportRequest};
use tracing::{error, info};

pub const UPLOAD_PATH: &str = "/api/upload";

/// Sends the selected file to the ingestion endpoint and records the request id.
pub async fn upload_direct(
    transport: &dyn Transport,
    session: &mut Session,
) -> Result<UploadReceipt, WorkflowError> {
    let file = session.file().ok_or(WorkflowError::NoFileSelected)?.clone();
    info!(
        "📤 Direct upload: {} ({} bytes, {})",
        file.name,
        file.len(),
        file.content_type
    );

    let request = TransportRequest::post(Target::backend(UPLOAD_PATH)).multipart(file);
    let receipt: UploadReceipt = transport
        .send(request)
        .await
        .and_then(|response| response.decode())
        .map_err(|e| {
            error!("❌ Direct upload rejected: {}", e);
            WorkflowError::UploadRejected(e)
        })?;

    session.commit_request(receipt.request_id.clone(), UploadPath::Direct);
    info!(
        "✅ Upload accepted: request_id={} stored_at={}",
        receipt.request_id,
        receipt.s3_uri.as_deref().unwrap_or("-")
    );
    Ok(receipt)
}
