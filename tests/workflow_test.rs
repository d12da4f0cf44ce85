use async_trait::async_trait;
use bytes::Bytes;
use mc_vision_client::shell::run_shell;
use mc_vision_client::{
    ClientConfig, Coordinator, CoordinatorHandle, ErrorKind, Policy, Provider, RequestBody,
    ResultSlot, SelectedFile, Target, Transport, TransportError, TransportRequest,
    TransportResponse, UploadPath, WorkflowError, WorkflowState,
};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory backend: canned responses per "METHOD path", every request recorded.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<(StatusCode, Value)>>>,
    calls: Mutex<Vec<TransportRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    fn respond(&self, method: Method, path: &str, status: StatusCode, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .entry(format!("{} {}", method, path))
            .or_default()
            .push_back((status, body));
    }

    fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn call_keys(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| format!("{} {}", c.method, c.target.path()))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let key = format!("{} {}", request.method, request.target.path());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (status, body) = scripted.unwrap_or_else(|| panic!("unexpected call: {}", key));
        Ok(TransportResponse {
            status,
            target: key,
            body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        })
    }
}

fn image() -> SelectedFile {
    SelectedFile::from_bytes("cat.jpg", vec![0xFFu8, 0xD8, 0xFF, 0xE0, 1, 2, 3], "image/jpeg")
}

fn coordinator(transport: &Arc<ScriptedTransport>) -> Coordinator {
    Coordinator::new(transport.clone(), ClientConfig::default())
}

fn script_direct_upload(transport: &ScriptedTransport, request_id: &str) {
    transport.respond(
        Method::POST,
        "/api/upload",
        StatusCode::OK,
        json!({"request_id": request_id, "s3_uri": "local://x"}),
    );
}

fn script_presigned(transport: &ScriptedTransport) {
    transport.respond(
        Method::POST,
        "/api/s3/presign",
        StatusCode::OK,
        json!({"url": "https://store/x", "key": "k1"}),
    );
    transport.respond(Method::PUT, "https://store/x", StatusCode::OK, Value::Null);
    transport.respond(
        Method::POST,
        "/api/s3/analyze",
        StatusCode::OK,
        json!({"request_id": "r2", "label": "dog"}),
    );
}

fn assert_cleared(coordinator: &Coordinator) {
    let session = coordinator.session();
    assert_eq!(session.request_id(), None);
    assert_eq!(session.storage_key(), None);
    assert!(session.results().is_empty());
}

#[tokio::test]
async fn test_select_file_clears_identifiers_and_results() {
    let transport = ScriptedTransport::new();
    let mut coordinator = coordinator(&transport);

    coordinator.select_file(image());
    assert_cleared(&coordinator);
    assert_eq!(coordinator.state(), WorkflowState::FileSelected);

    script_presigned(&transport);
    coordinator.upload(UploadPath::Presigned).await.unwrap();
    transport.respond(Method::POST, "/api/analyze/azure", StatusCode::OK, json!({"a": 1}));
    transport.respond(Method::POST, "/api/analyze/aws", StatusCode::OK, json!({"b": 2}));
    transport.respond(Method::POST, "/api/route", StatusCode::OK, json!({"chosen": "azure"}));
    coordinator.analyze(Provider::Azure).await.unwrap();
    coordinator.analyze(Provider::Aws).await.unwrap();
    coordinator.route().await.unwrap();
    assert!(ResultSlot::ALL.iter().all(|s| coordinator.session().result(*s).is_some()));

    coordinator.select_file(image());
    assert_cleared(&coordinator);
    assert_eq!(coordinator.state(), WorkflowState::FileSelected);

    coordinator.select_file(image());
    assert_cleared(&coordinator);
}

#[tokio::test]
async fn test_direct_upload_without_file_makes_no_call() {
    let transport = ScriptedTransport::new();
    let mut coordinator = coordinator(&transport);

    let err = coordinator.upload_direct().await.unwrap_err();
    assert!(matches!(err, WorkflowError::NoFileSelected));
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = coordinator.upload(UploadPath::Presigned).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NoFileSelected));

    assert!(transport.calls().is_empty());
    assert_eq!(coordinator.state(), WorkflowState::Empty);
}

#[tokio::test]
async fn test_triggers_require_request_id() {
    let transport = ScriptedTransport::new();
    let mut coordinator = coordinator(&transport);

    for with_file in [false, true] {
        if with_file {
            coordinator.select_file(image());
        }
        for provider in [Provider::Azure, Provider::Aws] {
            let err = coordinator.analyze(provider).await.unwrap_err();
            assert!(matches!(err, WorkflowError::MissingRequestId));
            assert_eq!(err.kind(), ErrorKind::Precondition);
        }
        let err = coordinator.route().await.unwrap_err();
        assert!(matches!(err, WorkflowError::MissingRequestId));
        let err = coordinator.lookup_result(None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MissingRequestId));
    }

    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_direct_upload_rejected_leaves_request_id_unset() {
    let transport = ScriptedTransport::new();
    transport.respond(
        Method::POST,
        "/api/upload",
        StatusCode::PAYLOAD_TOO_LARGE,
        json!({"detail": "too big"}),
    );
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());

    let err = coordinator.upload_direct().await.unwrap_err();
    assert!(matches!(err, WorkflowError::UploadRejected(_)));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(
        err.transport().and_then(|t| t.status()),
        Some(StatusCode::PAYLOAD_TOO_LARGE)
    );
    assert_eq!(coordinator.session().request_id(), None);
    assert_eq!(coordinator.state(), WorkflowState::FileSelected);
}

#[tokio::test]
async fn test_storage_write_failure_keeps_storage_key_unset() {
    let transport = ScriptedTransport::new();
    transport.respond(
        Method::POST,
        "/api/s3/presign",
        StatusCode::OK,
        json!({"url": "https://store/x", "key": "k1"}),
    );
    transport.respond(Method::PUT, "https://store/x", StatusCode::FORBIDDEN, Value::Null);
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());

    let err = coordinator.upload_presigned().await.unwrap_err();

    assert!(matches!(err, WorkflowError::StorageWriteFailed(_)));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(coordinator.session().storage_key(), None);
    assert_eq!(coordinator.session().request_id(), None);
    assert_eq!(
        transport.call_keys(),
        ["POST /api/s3/presign", "PUT https://store/x"]
    );
}

#[tokio::test]
async fn test_analysis_trigger_failure_is_partial_upload() {
    let transport = ScriptedTransport::new();
    transport.respond(
        Method::POST,
        "/api/s3/presign",
        StatusCode::OK,
        json!({"url": "https://store/x", "key": "k1"}),
    );
    transport.respond(Method::PUT, "https://store/x", StatusCode::OK, Value::Null);
    transport.respond(
        Method::POST,
        "/api/s3/analyze",
        StatusCode::BAD_GATEWAY,
        json!({"detail": "failed to fetch object from S3"}),
    );
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());

    let err = coordinator.upload(UploadPath::Presigned).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PartialUpload);
    match &err {
        WorkflowError::AnalysisTriggerFailed { storage_key, .. } => assert_eq!(storage_key, "k1"),
        other => panic!("unexpected error: {other:?}"),
    }
    let session = coordinator.session();
    assert_eq!(session.storage_key(), Some("k1"));
    assert_eq!(session.request_id(), None);
    assert_eq!(session.result(ResultSlot::PresignedAnalysis), None);
    assert_eq!(coordinator.state(), WorkflowState::Stored);
}

#[tokio::test]
async fn test_analysis_response_without_request_id_is_partial_upload() {
    let transport = ScriptedTransport::new();
    script_presigned(&transport);
    // Replace the scripted analyze response with one lacking request_id.
    transport.responses.lock().unwrap().insert(
        "POST /api/s3/analyze".to_string(),
        VecDeque::from([(StatusCode::OK, json!({"results": []}))]),
    );
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());

    let err = coordinator.upload_presigned().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialUpload);
    assert_eq!(coordinator.session().storage_key(), Some("k1"));
    assert_eq!(coordinator.session().request_id(), None);
}

#[tokio::test]
async fn test_reanalyze_overwrites_only_its_own_slot() {
    let transport = ScriptedTransport::new();
    script_direct_upload(&transport, "r1");
    transport.respond(Method::POST, "/api/analyze/azure", StatusCode::OK, json!({"call": 1}));
    transport.respond(Method::POST, "/api/analyze/aws", StatusCode::OK, json!({"call": 2}));
    transport.respond(Method::POST, "/api/analyze/azure", StatusCode::OK, json!({"call": 3}));
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());
    coordinator.upload_direct().await.unwrap();

    coordinator.analyze(Provider::Azure).await.unwrap();
    coordinator.analyze(Provider::Aws).await.unwrap();
    coordinator.analyze(Provider::Azure).await.unwrap();

    let session = coordinator.session();
    assert_eq!(session.result(ResultSlot::DirectAzure), Some(&json!({"call": 3})));
    assert_eq!(session.result(ResultSlot::DirectAws), Some(&json!({"call": 2})));
    assert_eq!(session.result(ResultSlot::Route), None);
    assert_eq!(session.result(ResultSlot::PresignedAnalysis), None);
}

#[tokio::test]
async fn test_analyze_failure_keeps_previous_result() {
    let transport = ScriptedTransport::new();
    script_direct_upload(&transport, "r1");
    transport.respond(Method::POST, "/api/analyze/aws", StatusCode::OK, json!({"label": "cat"}));
    transport.respond(
        Method::POST,
        "/api/analyze/aws",
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"detail": "bedrock throttled"}),
    );
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());
    coordinator.upload_direct().await.unwrap();
    coordinator.analyze(Provider::Aws).await.unwrap();

    let err = coordinator.analyze(Provider::Aws).await.unwrap_err();

    match &err {
        WorkflowError::AnalysisCallFailed { provider, source } => {
            assert_eq!(*provider, Provider::Aws);
            assert_eq!(source.body(), Some(&json!({"detail": "bedrock throttled"})));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        coordinator.session().result(ResultSlot::DirectAws),
        Some(&json!({"label": "cat"}))
    );
}

#[tokio::test]
async fn test_scenario_direct_upload_then_azure() {
    let transport = ScriptedTransport::new();
    script_direct_upload(&transport, "r1");
    transport.respond(
        Method::POST,
        "/api/analyze/azure",
        StatusCode::OK,
        json!({"label": "cat", "confidence": 0.9}),
    );
    let mut coordinator = coordinator(&transport);
    let file = image();
    coordinator.select_file(file.clone());

    let outcome = coordinator.upload(UploadPath::Direct).await.unwrap();
    assert_eq!(outcome.request_id, "r1");
    assert_eq!(outcome.storage_key, None);
    assert_eq!(outcome.stored_at.as_deref(), Some("local://x"));
    assert_eq!(coordinator.state(), WorkflowState::Uploaded);

    let result = coordinator.analyze(Provider::Azure).await.unwrap();
    assert_eq!(result, json!({"label": "cat", "confidence": 0.9}));
    assert_eq!(
        coordinator.session().result(ResultSlot::DirectAzure),
        Some(&json!({"label": "cat", "confidence": 0.9}))
    );

    let calls = transport.calls();
    assert_eq!(calls[0].body, RequestBody::Multipart(file));
    assert_eq!(calls[1].target, Target::backend("/api/analyze/azure"));
    assert_eq!(
        calls[1].body,
        RequestBody::Json(json!({"request_id": "r1", "model_preset": "cheap"}))
    );
}

#[tokio::test]
async fn test_scenario_presigned_upload() {
    let transport = ScriptedTransport::new();
    script_presigned(&transport);
    let mut coordinator = coordinator(&transport);
    let file = image();
    coordinator.select_file(file.clone());

    let outcome = coordinator.upload(UploadPath::Presigned).await.unwrap();

    let session = coordinator.session();
    assert_eq!(session.storage_key(), Some("k1"));
    assert_eq!(session.request_id(), Some("r2"));
    assert_eq!(
        session.result(ResultSlot::PresignedAnalysis),
        Some(&json!({"request_id": "r2", "label": "dog"}))
    );
    assert_eq!(session.request_origin(), Some(UploadPath::Presigned));
    assert_eq!(coordinator.state(), WorkflowState::Analyzed);
    assert_eq!(outcome.storage_key.as_deref(), Some("k1"));
    assert_eq!(outcome.analysis, Some(json!({"request_id": "r2", "label": "dog"})));

    let calls = transport.calls();
    assert_eq!(
        calls[0].target.query(),
        [("content_type".to_string(), "image/jpeg".to_string())]
    );
    assert_eq!(calls[1].method, Method::PUT);
    assert_eq!(
        calls[1].body,
        RequestBody::Bytes {
            content_type: "image/jpeg".to_string(),
            data: file.bytes.clone(),
        }
    );
    assert_eq!(calls[2].body, RequestBody::Json(json!({"s3_key": "k1"})));
}

#[tokio::test]
async fn test_scenario_presign_failure_leaves_session_unchanged() {
    let transport = ScriptedTransport::new();
    transport.respond(
        Method::POST,
        "/api/s3/presign",
        StatusCode::BAD_REQUEST,
        json!({"detail": "content_type is required"}),
    );
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());
    let before = coordinator.session().clone();

    let err = coordinator.upload(UploadPath::Presigned).await.unwrap_err();

    assert!(matches!(err, WorkflowError::PresignFailed(_)));
    assert_eq!(coordinator.session(), &before);
    assert_cleared(&coordinator);
    assert_eq!(transport.call_keys(), ["POST /api/s3/presign"]);
}

#[tokio::test]
async fn test_presigned_failure_keeps_earlier_session_fields() {
    let transport = ScriptedTransport::new();
    script_direct_upload(&transport, "r1");
    transport.respond(Method::POST, "/api/s3/presign", StatusCode::SERVICE_UNAVAILABLE, Value::Null);
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());
    coordinator.upload_direct().await.unwrap();

    coordinator.upload_presigned().await.unwrap_err();

    assert_eq!(coordinator.session().request_id(), Some("r1"));
    assert_eq!(coordinator.state(), WorkflowState::Uploaded);
}

#[tokio::test]
async fn test_route_sends_selected_policy() {
    let transport = ScriptedTransport::new();
    script_direct_upload(&transport, "r1");
    transport.respond(
        Method::POST,
        "/api/route",
        StatusCode::OK,
        json!({"chosen": "aws", "reason": "policy=quality"}),
    );
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());
    coordinator.set_policy(Policy::Quality);
    coordinator.upload_direct().await.unwrap();

    let decision = coordinator.route().await.unwrap();

    assert_eq!(decision["chosen"], "aws");
    assert_eq!(
        transport.calls()[1].body,
        RequestBody::Json(json!({"request_id": "r1", "policy": "quality"}))
    );
    assert_eq!(coordinator.session().result(ResultSlot::Route), Some(&decision));
}

#[tokio::test]
async fn test_lookup_defaults_to_session_request_id() {
    let transport = ScriptedTransport::new();
    script_direct_upload(&transport, "r1");
    transport.respond(Method::GET, "/api/result/r1", StatusCode::OK, json!({"found": false}));
    transport.respond(Method::GET, "/api/result/other", StatusCode::OK, json!({"found": true}));
    let mut coordinator = coordinator(&transport);
    coordinator.select_file(image());
    coordinator.upload_direct().await.unwrap();
    let before = coordinator.session().clone();

    assert_eq!(coordinator.lookup_result(None).await.unwrap(), json!({"found": false}));
    assert_eq!(
        coordinator.lookup_result(Some("other")).await.unwrap(),
        json!({"found": true})
    );
    assert_eq!(coordinator.session(), &before);
}

#[tokio::test]
async fn test_lookup_keeps_request_id_in_one_path_segment() {
    let transport = ScriptedTransport::new();
    transport.respond(Method::GET, "/api/result/a%5Cb", StatusCode::OK, json!({"found": false}));
    let coordinator = coordinator(&transport);

    for id in [".", "..", " .. "] {
        let err = coordinator.lookup_result(Some(id)).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequestId(_)));
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
    assert!(transport.calls().is_empty());

    coordinator.lookup_result(Some("a\\b")).await.unwrap();
    assert_eq!(transport.call_keys(), vec!["GET /api/result/a%5Cb"]);
}

#[tokio::test]
async fn test_handle_serializes_concurrent_triggers() {
    let transport = ScriptedTransport::with_delay(Duration::from_millis(20));
    script_direct_upload(&transport, "r1");
    transport.respond(Method::POST, "/api/analyze/azure", StatusCode::OK, json!({"p": "azure"}));
    transport.respond(Method::POST, "/api/analyze/aws", StatusCode::OK, json!({"p": "aws"}));
    transport.respond(Method::POST, "/api/route", StatusCode::OK, json!({"chosen": "azure"}));
    let handle = CoordinatorHandle::spawn(coordinator(&transport));

    handle.select_file(image()).await.unwrap();
    handle.upload(UploadPath::Direct).await.unwrap();

    let (azure, aws, route) = tokio::join!(
        handle.analyze(Provider::Azure),
        handle.analyze(Provider::Aws),
        handle.route()
    );
    azure.unwrap();
    aws.unwrap();
    route.unwrap();

    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    let session = handle.snapshot().await.unwrap();
    assert_eq!(session.result(ResultSlot::DirectAzure), Some(&json!({"p": "azure"})));
    assert_eq!(session.result(ResultSlot::DirectAws), Some(&json!({"p": "aws"})));
    assert_eq!(session.result(ResultSlot::Route), Some(&json!({"chosen": "azure"})));
}

#[tokio::test]
async fn test_handle_reports_stopped_worker() {
    let transport = ScriptedTransport::new();
    let (handle, worker) = CoordinatorHandle::new(coordinator(&transport));
    drop(worker);

    let err = handle.route().await.unwrap_err();
    assert!(matches!(err, WorkflowError::CoordinatorStopped));
}

#[tokio::test]
async fn test_shell_session() {
    let transport = ScriptedTransport::new();
    script_direct_upload(&transport, "r1");
    transport.respond(
        Method::POST,
        "/api/analyze/azure",
        StatusCode::OK,
        json!({"label": "cat", "confidence": 0.9}),
    );
    let handle = CoordinatorHandle::spawn(coordinator(&transport));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cat.jpg");
    std::fs::write(&path, [0xFFu8, 0xD8, 0xFF, 0xE0, 0, 0]).unwrap();

    let script = format!(
        "upload\npick {}\nanalyze azure\nupload\nanalyze azure\nbogus\nresult ..\nstatus\nquit\nroute\n",
        path.display()
    );
    let mut out = Vec::new();
    run_shell(&handle, "image/jpeg", script.as_bytes(), &mut out)
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("pick a file first"));
    assert!(text.contains("picked cat.jpg"));
    assert!(text.contains("run `upload` or `s3` first"));
    assert!(text.contains("upload ok: request_id=r1 stored_at=local://x"));
    assert!(text.contains("a request id cannot be `.` or `..`"));
    assert!(text.contains("\"label\": \"cat\""));
    assert!(text.contains("request_id: r1"));
    assert!(text.contains("S3 key: -"));
    assert!(text.contains("== S3 Analyze Result ==\nno data"));
    // Nothing after `quit` runs.
    assert_eq!(
        transport.call_keys(),
        ["POST /api/upload", "POST /api/analyze/azure"]
    );
}
