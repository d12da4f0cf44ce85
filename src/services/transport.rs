use crate::error::TransportError;
use crate::models::SelectedFile;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use url::{Position, Url};

/// Where a request goes: a path on the backend, or a URL handed out by it.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Backend {
        path: String,
        query: Vec<(String, String)>,
    },
    External(Url),
}

impl Target {
    pub fn backend(path: impl Into<String>) -> Self {
        Target::Backend {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn external(url: Url) -> Self {
        Target::External(url)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Target::Backend { query, .. } = &mut self {
            query.push((key.into(), value.into()));
        }
        self
    }

    /// Path without query for backend targets, full URL for external ones.
    pub fn path(&self) -> &str {
        match self {
            Target::Backend { path, .. } => path,
            Target::External(url) => url.as_str(),
        }
    }

    pub fn query(&self) -> &[(String, String)] {
        match self {
            Target::Backend { query, .. } => query,
            Target::External(_) => &[],
        }
    }

    /// Resolves against the backend base, keeping any path prefix the base carries.
    pub fn resolve(&self, base: &Url) -> Result<Url, TransportError> {
        match self {
            Target::External(url) => Ok(url.clone()),
            Target::Backend { path, query } => {
                let joined = format!(
                    "{}/{}",
                    base.as_str().trim_end_matches('/'),
                    path.trim_start_matches('/')
                );
                let mut url = Url::parse(&joined).map_err(|source| TransportError::InvalidUrl {
                    target: joined.clone(),
                    source,
                })?;
                if !query.is_empty() {
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in query {
                        pairs.append_pair(key, value);
                    }
                }
                Ok(url)
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Backend { path, query } => {
                f.write_str(path)?;
                for (i, (key, value)) in query.iter().enumerate() {
                    let sep = if i == 0 { '?' } else { '&' };
                    write!(f, "{sep}{key}={value}")?;
                }
                Ok(())
            }
            // Presigned URLs embed credentials in the query string.
            Target::External(url) => f.write_str(&url[..Position::AfterPath]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// `file` part with name and content type, plus a `file_name` text field
    Multipart(SelectedFile),
    /// Raw bytes sent unmodified with the given content type
    Bytes { content_type: String, data: Bytes },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub target: Target,
    pub body: RequestBody,
}

impl TransportRequest {
    pub fn new(method: Method, target: Target) -> Self {
        Self {
            method,
            target,
            body: RequestBody::Empty,
        }
    }

    pub fn get(target: Target) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: Target) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn put(target: Target) -> Self {
        Self::new(Method::PUT, target)
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn multipart(mut self, file: SelectedFile) -> Self {
        self.body = RequestBody::Multipart(file);
        self
    }

    pub fn bytes(mut self, content_type: impl Into<String>, data: Bytes) -> Self {
        self.body = RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        };
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub target: String,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode {
            target: self.target.clone(),
            reason: e.to_string(),
        })
    }

    pub fn json(&self) -> Result<Value, TransportError> {
        self.decode()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the request and returns the response whatever its status.
    async fn execute(&self, request: TransportRequest)
    -> Result<TransportResponse, TransportError>;

    /// Like `execute`, but any non-success status becomes `TransportError::Status`.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let method = request.method.clone();
        let response = self.execute(request).await?;

        if response.status.is_success() {
            return Ok(response);
        }

        Err(TransportError::Status {
            method,
            body: serde_json::from_slice(&response.body).ok(),
            target: response.target,
            status: response.status,
        })
    }
}

pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(client: Client, api_base: &str) -> Result<Self, TransportError> {
        let base = Url::parse(api_base).map_err(|source| TransportError::InvalidUrl {
            target: api_base.to_string(),
            source,
        })?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let TransportRequest {
            method,
            target,
            body,
        } = request;
        let url = target.resolve(&self.base)?;
        let label = target.to_string();
        let request_failed = |source: reqwest::Error| TransportError::Request {
            method: method.clone(),
            target: label.clone(),
            source,
        };

        let builder = self.client.request(method.clone(), url);
        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(file) => {
                let part = Part::bytes(file.bytes.to_vec())
                    .file_name(file.name.clone())
                    .mime_str(&file.content_type)
                    .map_err(request_failed)?;
                let form = Form::new().part("file", part).text("file_name", file.name);
                builder.multipart(form)
            }
            RequestBody::Bytes { content_type, data } => {
                builder.header(CONTENT_TYPE, content_type).body(data)
            }
        };

        tracing::debug!("➡️  {} {}", method, label);
        let response = builder.send().await.map_err(request_failed)?;
        let status = response.status();
        let body = response.bytes().await.map_err(request_failed)?;
        tracing::debug!("⬅️  {} {} -> {}", method, label, status);

        Ok(TransportResponse {
            status,
            target: label,
            body,
        })
    }
}
