//! Line-oriented front end: one command per line, each a discrete user action.

use crate::error::{ErrorKind, WorkflowError};
use crate::models::{Policy, Provider, SelectedFile};
use crate::services::session::{ResultSlot, Session, UploadPath};
use crate::services::worker::CoordinatorHandle;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ShellCommand {
    /// Pick an image file; clears the request id, storage key and all results
    Pick { path: PathBuf },
    /// Upload the picked file to /api/upload
    Upload,
    /// Upload through a presigned storage URL, then analyze server-side
    S3,
    /// Analyze the uploaded request with one provider
    Analyze {
        #[arg(value_enum)]
        provider: Provider,
    },
    /// Ask the router to pick a provider for the current policy
    Route,
    /// Change the routing policy
    Policy {
        #[arg(value_enum)]
        policy: Policy,
    },
    /// Show identifiers and every result panel
    Status,
    /// Check backend health
    Health,
    /// Fetch the stored record for a request id (defaults to the current one)
    Result { request_id: Option<String> },
    #[command(alias = "exit")]
    Quit,
}

impl ShellCommand {
    pub fn parse_line(line: &str) -> Result<Self, clap::Error> {
        ShellLine::try_parse_from(line.split_whitespace()).map(|l| l.command)
    }
}

pub fn render_panel<W: Write>(out: &mut W, title: &str, data: Option<&Value>) -> std::io::Result<()> {
    writeln!(out, "== {} ==", title)?;
    match data.map(serde_json::to_string_pretty) {
        Some(Ok(pretty)) => writeln!(out, "{}", pretty),
        Some(Err(_)) | None => writeln!(out, "no data"),
    }
}

pub fn render_session<W: Write>(out: &mut W, session: &Session) -> std::io::Result<()> {
    writeln!(out, "state: {:?}", session.state())?;
    writeln!(out, "policy: {}", session.policy())?;
    writeln!(out, "request_id: {}", session.request_id().unwrap_or("-"))?;
    writeln!(out, "S3 key: {}", session.storage_key().unwrap_or("-"))?;
    for (slot, data) in session.panels() {
        render_panel(out, slot.title(), data)?;
    }
    Ok(())
}

pub fn report_error<W: Write>(out: &mut W, err: &WorkflowError) -> std::io::Result<()> {
    writeln!(out, "⚠️  {}", err)?;
    match err.kind() {
        ErrorKind::Precondition => match err {
            WorkflowError::NoFileSelected => writeln!(out, "   pick a file first"),
            WorkflowError::InvalidRequestId(_) => {
                writeln!(out, "   a request id cannot be `.` or `..`")
            }
            _ => writeln!(out, "   run `upload` or `s3` first"),
        },
        ErrorKind::PartialUpload => {
            writeln!(out, "   the object is in storage but has no analysis yet")
        }
        ErrorKind::Transport => match err.transport().and_then(|t| t.body()) {
            Some(body) => render_panel(out, "Error payload", Some(body)),
            None => Ok(()),
        },
    }
}

/// Reads commands until end of input or `quit`. Failures are reported and the loop goes on.
pub async fn run_shell<R, W>(
    handle: &CoordinatorHandle,
    fallback_type: &str,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    prompt(out)?;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            prompt(out)?;
            continue;
        }

        match ShellCommand::parse_line(&line) {
            Ok(ShellCommand::Quit) => break,
            Ok(command) => execute(handle, fallback_type, command, out).await?,
            Err(e) => writeln!(out, "{}", e)?,
        }
        prompt(out)?;
    }

    writeln!(out)?;
    Ok(())
}

fn prompt<W: Write>(out: &mut W) -> std::io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

async fn execute<W: Write>(
    handle: &CoordinatorHandle,
    fallback_type: &str,
    command: ShellCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    let Err(e) = dispatch(handle, fallback_type, command, out).await else {
        return Ok(());
    };
    // Workflow failures are reported and the shell goes on; anything else ends it.
    match e.downcast::<WorkflowError>() {
        Ok(WorkflowError::CoordinatorStopped) => Err(WorkflowError::CoordinatorStopped.into()),
        Ok(err) => Ok(report_error(out, &err)?),
        Err(other) => Err(other),
    }
}

async fn dispatch<W: Write>(
    handle: &CoordinatorHandle,
    fallback_type: &str,
    command: ShellCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        ShellCommand::Pick { path } => {
            let file = match SelectedFile::from_path(&path, fallback_type).await {
                Ok(file) => file,
                Err(e) => {
                    writeln!(out, "⚠️  cannot read {}: {}", path.display(), e)?;
                    return Ok(());
                }
            };
            writeln!(
                out,
                "picked {} ({} bytes, {})",
                file.name,
                file.len(),
                file.content_type
            )?;
            handle.select_file(file).await?;
        }
        ShellCommand::Upload => {
            let outcome = handle.upload(UploadPath::Direct).await?;
            writeln!(
                out,
                "upload ok: request_id={} stored_at={}",
                outcome.request_id,
                outcome.stored_at.as_deref().unwrap_or("-")
            )?;
        }
        ShellCommand::S3 => {
            let outcome = handle.upload(UploadPath::Presigned).await?;
            writeln!(out, "S3 analyze done: request_id={}", outcome.request_id)?;
            render_panel(
                out,
                ResultSlot::PresignedAnalysis.title(),
                outcome.analysis.as_ref(),
            )?;
        }
        ShellCommand::Analyze { provider } => {
            let result = handle.analyze(provider).await?;
            render_panel(out, ResultSlot::for_provider(provider).title(), Some(&result))?;
        }
        ShellCommand::Route => {
            let decision = handle.route().await?;
            render_panel(out, ResultSlot::Route.title(), Some(&decision))?;
        }
        ShellCommand::Policy { policy } => {
            writeln!(out, "policy: {}", policy)?;
            handle.set_policy(policy).await?;
        }
        ShellCommand::Status => render_session(out, &handle.snapshot().await?)?,
        ShellCommand::Health => render_panel(out, "Health", Some(&handle.health().await?))?,
        ShellCommand::Result { request_id } => {
            let record = handle.lookup_result(request_id).await?;
            render_panel(out, "Stored Result", Some(&record))?;
        }
        ShellCommand::Quit => {}
    }
    Ok(())
}
