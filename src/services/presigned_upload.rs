//! Upload through object storage.
//!
//! Three steps, each gated on the previous one:
//! 1. ask the backend for a presigned write URL and storage key
//! 2. `PUT` the file bytes to that URL
//! 3. tell the backend the object is ready so it runs analysis server-side
//!
//! The storage key is committed to the session only once the write has been
//! confirmed; the request id and analysis payload only once step 3 succeeds.

use crate::error::{TransportError, WorkflowError};
use crate::models::{PresignGrant, SelectedFile, StorageAnalysis};
use crate::services::session::{ResultSlot, Session, UploadPath};
use crate::services::transport::{Target, Transport, TransportRequest};
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;

pub const PRESIGN_PATH: &str = "/api/s3/presign";
pub const STORAGE_ANALYZE_PATH: &str = "/api/s3/analyze";

pub async fn upload_presigned(
    transport: &dyn Transport,
    session: &mut Session,
) -> Result<StorageAnalysis, WorkflowError> {
    let file = session.file().ok_or(WorkflowError::NoFileSelected)?.clone();

    let grant = request_presign(transport, &file.content_type).await?;
    write_to_storage(transport, &grant, &file).await?;
    session.commit_storage_key(grant.storage_key.clone());

    let analysis = trigger_server_analysis(transport, &grant.storage_key).await?;
    session.commit_request(analysis.request_id.clone(), UploadPath::Presigned);
    session.store_result(ResultSlot::PresignedAnalysis, analysis.payload.clone());

    info!(
        "✅ Storage analysis complete: request_id={} key={}",
        analysis.request_id, grant.storage_key
    );
    Ok(analysis)
}

pub async fn request_presign(
    transport: &dyn Transport,
    content_type: &str,
) -> Result<PresignGrant, WorkflowError> {
    info!("🔏 Requesting presigned URL for {}", content_type);
    let request = TransportRequest::post(
        Target::backend(PRESIGN_PATH).with_query("content_type", content_type),
    );

    transport
        .send(request)
        .await
        .and_then(|response| response.decode())
        .map_err(|e| {
            error!("❌ Presign failed: {}", e);
            WorkflowError::PresignFailed(e)
        })
}

pub async fn write_to_storage(
    transport: &dyn Transport,
    grant: &PresignGrant,
    file: &SelectedFile,
) -> Result<(), WorkflowError> {
    let url = Url::parse(&grant.write_url).map_err(|source| {
        error!("❌ Presigned URL is not a valid URL: {}", source);
        WorkflowError::StorageWriteFailed(TransportError::InvalidUrl {
            target: grant.write_url.clone(),
            source,
        })
    })?;

    info!("☁️  Writing {} bytes to storage key {}", file.len(), grant.storage_key);
    let request = TransportRequest::put(Target::external(url))
        .bytes(file.content_type.clone(), file.bytes.clone());

    transport.send(request).await.map_err(|e| {
        error!("❌ Storage write failed for {}: {}", grant.storage_key, e);
        WorkflowError::StorageWriteFailed(e)
    })?;
    Ok(())
}

pub async fn trigger_server_analysis(
    transport: &dyn Transport,
    storage_key: &str,
) -> Result<StorageAnalysis, WorkflowError> {
    let partial = |source: TransportError| {
        warn!(
            "⚠️  Object {} is stored but has no analysis: {}",
            storage_key, source
        );
        WorkflowError::AnalysisTriggerFailed {
            storage_key: storage_key.to_string(),
            source,
        }
    };

    let request = TransportRequest::post(Target::backend(STORAGE_ANALYZE_PATH))
        .json(json!({ "s3_key": storage_key }));
    let response = transport.send(request).await.map_err(partial)?;
    let payload = response.json().map_err(partial)?;

    StorageAnalysis::from_payload(payload).ok_or_else(|| {
        partial(TransportError::Decode {
            target: STORAGE_ANALYZE_PATH.to_string(),
            reason: "missing string field 'request_id'".to_string(),
        })
    })
}
