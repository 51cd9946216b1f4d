//! Startup resolution of the assistant the bot runs against.

use std::path::Path;

use tracing::info;

use novel_assistant::AssistantGateway;
use novel_engine::assistant_spec;
use novel_persistence::atomic::atomic_write;

use crate::error::{Result, TelegramError};

/// Where to look for the assistant id, in order.
pub struct AssistantSource<'a> {
    /// Id from configuration. Wins when set.
    pub configured: Option<&'a str>,
    /// File remembering an id created on an earlier start.
    pub id_file: &'a Path,
    /// Scenario used as instructions when a new assistant is created.
    pub scenario_path: &'a Path,
    /// Model for a new assistant.
    pub model: &'a str,
}

/// Configured id, else the remembered one, else a freshly created assistant
/// whose id is remembered for the next start.
pub async fn resolve_assistant_id(
    source: &AssistantSource<'_>,
    gateway: &dyn AssistantGateway,
) -> Result<String> {
    if let Some(id) = source.configured.map(str::trim).filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }

    match tokio::fs::read_to_string(source.id_file).await {
        Ok(content) if !content.trim().is_empty() => {
            let id = content.trim().to_string();
            info!(assistant_id = %id, "Using remembered assistant");
            return Ok(id);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let scenario = tokio::fs::read_to_string(source.scenario_path)
        .await
        .map_err(|source_err| TelegramError::ScenarioMissing {
            path: source.scenario_path.to_path_buf(),
            source: source_err,
        })?;

    let id = gateway
        .create_assistant(&assistant_spec(&scenario, source.model))
        .await?;
    atomic_write(source.id_file, id.as_bytes())?;
    info!(assistant_id = %id, model = source.model, "Created assistant");
    Ok(id)
}
