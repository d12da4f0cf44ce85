use crate::models::{Policy, Provider, SelectedFile};
use serde_json::Value;

/// The two ways an image reaches the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UploadPath {
    /// `POST /api/upload` with the file as multipart
    Direct,
    /// presign, `PUT` to storage, then `POST /api/s3/analyze`
    Presigned,
}

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Empty,
    FileSelected,
    /// Object written to storage, analysis never completed
    Stored,
    /// Request created by the direct path
    Uploaded,
    /// Request created and analyzed by the presigned path
    Analyzed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSlot {
    DirectAws,
    DirectAzure,
    Route,
    PresignedAnalysis,
}

impl ResultSlot {
    /// Display order of the result panels.
    pub const ALL: [ResultSlot; 4] = [
        ResultSlot::DirectAws,
        ResultSlot::DirectAzure,
        ResultSlot::Route,
        ResultSlot::PresignedAnalysis,
    ];

    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::Azure => ResultSlot::DirectAzure,
            Provider::Aws => ResultSlot::DirectAws,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ResultSlot::DirectAws => "AWS Result",
            ResultSlot::DirectAzure => "Azure Result",
            ResultSlot::Route => "Router Result",
            ResultSlot::PresignedAnalysis => "S3 Analyze Result",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSlots {
    pub direct_aws: Option<Value>,
    pub direct_azure: Option<Value>,
    pub route: Option<Value>,
    pub presigned_analysis: Option<Value>,
}

impl ResultSlots {
    pub fn get(&self, slot: ResultSlot) -> Option<&Value> {
        match slot {
            ResultSlot::DirectAws => self.direct_aws.as_ref(),
            ResultSlot::DirectAzure => self.direct_azure.as_ref(),
            ResultSlot::Route => self.route.as_ref(),
            ResultSlot::PresignedAnalysis => self.presigned_analysis.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: ResultSlot) -> &mut Option<Value> {
        match slot {
            ResultSlot::DirectAws => &mut self.direct_aws,
            ResultSlot::DirectAzure => &mut self.direct_azure,
            ResultSlot::Route => &mut self.route,
            ResultSlot::PresignedAnalysis => &mut self.presigned_analysis,
        }
    }

    pub fn is_empty(&self) -> bool {
        ResultSlot::ALL.iter().all(|slot| self.get(*slot).is_none())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveRequest {
    id: String,
    via: UploadPath,
}

/// Per-run client state. Flows mutate it only after a step has succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    file: Option<SelectedFile>,
    request: Option<ActiveRequest>,
    storage_key: Option<String>,
    policy: Policy,
    results: ResultSlots,
}

impl Session {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Replaces the file and clears identifiers and every result slot together.
    pub fn select_file(&mut self, file: SelectedFile) {
        *self = Self {
            file: Some(file),
            policy: self.policy,
            ..Self::default()
        };
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.id.as_str())
    }

    /// Upload path that produced the current request id.
    pub fn request_origin(&self) -> Option<UploadPath> {
        self.request.as_ref().map(|r| r.via)
    }

    pub fn storage_key(&self) -> Option<&str> {
        self.storage_key.as_deref()
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn results(&self) -> &ResultSlots {
        &self.results
    }

    pub fn result(&self, slot: ResultSlot) -> Option<&Value> {
        self.results.get(slot)
    }

    pub fn panels(&self) -> impl Iterator<Item = (ResultSlot, Option<&Value>)> + '_ {
        ResultSlot::ALL
            .into_iter()
            .map(|slot| (slot, self.results.get(slot)))
    }

    pub fn state(&self) -> WorkflowState {
        match (&self.file, &self.request, &self.storage_key) {
            (None, _, _) => WorkflowState::Empty,
            (Some(_), Some(req), _) => match req.via {
                UploadPath::Direct => WorkflowState::Uploaded,
                UploadPath::Presigned => WorkflowState::Analyzed,
            },
            (Some(_), None, Some(_)) => WorkflowState::Stored,
            (Some(_), None, None) => WorkflowState::FileSelected,
        }
    }

    pub(crate) fn commit_request(&mut self, id: String, via: UploadPath) {
        self.request = Some(ActiveRequest { id, via });
    }

    pub(crate) fn commit_storage_key(&mut self, key: String) {
        self.storage_key = Some(key);
    }

    pub(crate) fn store_result(&mut self, slot: ResultSlot, value: Value) {
        *self.results.slot_mut(slot) = Some(value);
    }
}
