use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use mc_vision_client::infrastructure::transport;
use mc_vision_client::shell::{self, render_panel, render_session, report_error};
use mc_vision_client::{
    ClientConfig, Coordinator, CoordinatorHandle, Policy, Provider, SelectedFile, UploadPath,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (overrides MC_VISION_API_BASE)
    #[arg(long)]
    api_base: Option<String>,

    /// Initial routing policy (overrides MC_VISION_POLICY)
    #[arg(long, value_enum)]
    policy: Option<Policy>,

    /// Model preset sent with analyze calls (overrides MC_VISION_MODEL_PRESET)
    #[arg(long)]
    model_preset: Option<String>,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Interactive session, one action per line (default)
    Shell,
    /// Upload one file and run the requested analyses
    Run {
        file: PathBuf,

        #[arg(long, value_enum, default_value = "direct")]
        path: UploadPath,

        /// Provider to analyze with; repeatable
        #[arg(long = "analyze", value_enum)]
        analyze: Vec<Provider>,

        /// Ask the router for a provider after uploading
        #[arg(long)]
        route: bool,
    },
    /// Check backend health
    Health,
    /// Fetch the stored record for a request id
    Result { request_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mc_vision_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = ClientConfig::from_env();
    if let Some(api_base) = args.api_base {
        config.api_base = api_base;
    }
    if let Some(policy) = args.policy {
        config.default_policy = policy;
    }
    if let Some(model_preset) = args.model_preset {
        config.model_preset = model_preset;
    }
    info!(
        "🚀 Vision client: policy={} preset={}",
        config.default_policy, config.model_preset
    );

    let transport = transport::setup_transport(&config)?;
    let mut coordinator = Coordinator::new(transport, config);
    let fallback_type = coordinator.config().fallback_content_type.clone();
    let mut stdout = std::io::stdout();

    match args.command.unwrap_or(Mode::Shell) {
        Mode::Shell => {
            let handle = CoordinatorHandle::spawn(coordinator);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            shell::run_shell(&handle, &fallback_type, stdin, &mut stdout).await?;
        }
        Mode::Run {
            file,
            path,
            analyze,
            route,
        } => {
            let file = SelectedFile::from_path(&file, &fallback_type).await?;
            coordinator.select_file(file);

            let mut failures = 0;
            if let Err(e) = coordinator.upload(path).await {
                failures += 1;
                report_error(&mut stdout, &e)?;
            }
            for provider in analyze {
                if let Err(e) = coordinator.analyze(provider).await {
                    failures += 1;
                    report_error(&mut stdout, &e)?;
                }
            }
            if route {
                if let Err(e) = coordinator.route().await {
                    failures += 1;
                    report_error(&mut stdout, &e)?;
                }
            }

            render_session(&mut stdout, coordinator.session())?;
            stdout.flush()?;
            if failures > 0 {
                anyhow::bail!("{} step(s) failed", failures);
            }
        }
        Mode::Health => {
            let status = coordinator.health().await?;
            render_panel(&mut stdout, "Health", Some(&status))?;
        }
        Mode::Result { request_id } => {
            let record = coordinator.lookup_result(Some(&request_id)).await?;
            render_panel(&mut stdout, "Stored Result", Some(&record))?;
        }
    }

    Ok(())
}
