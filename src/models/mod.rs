use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Image picked by the user, held in memory until the next pick.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    /// Builds a file from raw bytes, sniffing the content type from magic bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>, fallback_type: &str) -> Self {
        let bytes = bytes.into();
        let content_type = infer::get(&bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| fallback_type.to_string());

        Self {
            name: name.into(),
            content_type,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>, fallback_type: &str) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self::from_bytes(name, data, fallback_type))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Strategy the routing service uses to pick a provider.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Favor the cheaper, faster provider
    #[default]
    Cost,
    /// Favor the higher-fidelity provider
    Quality,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Cost => "cost",
            Policy::Quality => "quality",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cost" => Ok(Policy::Cost),
            "quality" => Ok(Policy::Quality),
            other => Err(format!("unknown policy '{other}' (expected cost or quality)")),
        }
    }
}

/// Remote vision provider. Selection is encoded in the endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Azure,
    Aws,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Azure => "azure",
            Provider::Aws => "aws",
        }
    }

    pub fn analyze_path(&self) -> &'static str {
        match self {
            Provider::Azure => "/api/analyze/azure",
            Provider::Aws => "/api/analyze/aws",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => Ok(Provider::Azure),
            "aws" => Ok(Provider::Aws),
            other => Err(format!("unknown provider '{other}' (expected azure or aws)")),
        }
    }
}

/// Response of `POST /api/upload`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadReceipt {
    pub request_id: String,
    #[serde(default)]
    pub s3_uri: Option<String>,
}

/// Response of `POST /api/s3/presign`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresignGrant {
    #[serde(rename = "url")]
    pub write_url: String,
    #[serde(rename = "key")]
    pub storage_key: String,
}

/// Response of `POST /api/s3/analyze`: the fresh request id plus the full payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageAnalysis {
    pub request_id: String,
    pub payload: Value,
}

impl StorageAnalysis {
    pub fn from_payload(payload: Value) -> Option<Self> {
        let request_id = payload.get("request_id")?.as_str()?.to_string();
        Some(Self {
            request_id,
            payload,
        })
    }
}

/// Provider named by a route decision, when the backend reports one.
pub fn route_choice(decision: &Value) -> Option<&str> {
    decision.get("chosen").and_then(Value::as_str)
}
