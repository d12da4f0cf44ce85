use crate::config::ClientConfig;
use crate::services::transport::HttpTransport;
use std::sync::Arc;
use tracing::info;

pub fn setup_transport(config: &ClientConfig) -> anyhow::Result<Arc<HttpTransport>> {
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let transport = HttpTransport::new(client, &config.api_base)?;
    info!("🌐 Vision backend: {}", transport.base());

    Ok(Arc::new(transport))
}
