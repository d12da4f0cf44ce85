use crate::error::WorkflowError;
use crate::models::{Provider, route_choice};
use crate::services::session::{ResultSlot, Session};
use crate::services::transport::{Target, Transport, TransportRequest};
use serde_json::{Value, json};
use tracing::{error, info};

pub const ROUTE_PATH: &str = "/api/route";

/// Runs analysis on one provider against the session's request id.
///
/// Only that provider's result slot is overwritten. A non-success status
/// leaves the slot as it was; the backend's error payload stays reachable
/// through the returned error.
pub async fn analyze(
    transport: &dyn Transport,
    session: &mut Session,
    provider: Provider,
    model_preset: &str,
) -> Result<Value, WorkflowError> {
    let request_id = session
        .request_id()
        .ok_or(WorkflowError::MissingRequestId)?
        .to_string();
    info!(
        "🔬 Analyze with {}: request_id={} preset={}",
        provider, request_id, model_preset
    );

    let request = TransportRequest::post(Target::backend(provider.analyze_path()))
        .json(json!({ "request_id": request_id, "model_preset": model_preset }));
    let result = transport
        .send(request)
        .await
        .and_then(|response| response.json())
        .map_err(|source| {
            error!("❌ {} analysis failed: {}", provider, source);
            WorkflowError::AnalysisCallFailed { provider, source }
        })?;

    session.store_result(ResultSlot::for_provider(provider), result.clone());
    Ok(result)
}

/// Asks the routing service which provider fits the session's policy.
pub async fn route(transport: &dyn Transport, session: &mut Session) -> Result<Value, WorkflowError> {
    let request_id = session
        .request_id()
        .ok_or(WorkflowError::MissingRequestId)?
        .to_string();
    let policy = session.policy();
    info!("🧭 Route: request_id={} policy={}", request_id, policy);

    let request = TransportRequest::post(Target::backend(ROUTE_PATH))
        .json(json!({ "request_id": request_id, "policy": policy }));
    let decision = transport
        .send(request)
        .await
        .and_then(|response| response.json())
        .map_err(|e| {
            error!("❌ Route call failed: {}", e);
            WorkflowError::RouteCallFailed(e)
        })?;

    if let Some(chosen) = route_choice(&decision) {
        info!("🧭 Router chose {}", chosen);
    }
    session.store_result(ResultSlot::Route, decision.clone());
    Ok(decision)
}
