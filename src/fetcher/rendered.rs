use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use super::{SourceConnector, USER_AGENT};
use crate::error::{EngineError, Result};
use crate::models::{RawDocument, SourceDescriptor};

/// External collaborator that returns page markup with every collapsible
/// panel already expanded. The connector does no expansion of its own.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, source_id: &str, url: &str) -> Result<String>;
}

/// Plain GET. Enough for pages whose panels are only collapsed by CSS.
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Default for HttpRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, source_id: &str, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::fetch(source_id, format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(EngineError::fetch(source_id, format!("HTTP {}", resp.status())));
        }

        resp.text()
            .await
            .map_err(|e| EngineError::fetch(source_id, format!("failed to read body: {}", e)))
    }
}

/// Runs an external renderer (e.g. a headless browser with `--dump-dom`) and
/// takes its stdout as the markup. The URL is appended as the last argument.
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    /// `None` when the command line is empty.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    async fn render(&self, source_id: &str, url: &str) -> Result<String> {
        debug!(source = source_id, program = %self.program, "running external renderer");

        // kill_on_drop so an abandoned (timed out) fetch does not leave the browser running
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::fetch(source_id, format!("failed to run renderer '{}': {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::fetch(
                source_id,
                format!("renderer exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let markup = String::from_utf8_lossy(&output.stdout).to_string();
        if markup.trim().is_empty() {
            return Err(EngineError::IncompleteDocument {
                source_id: source_id.to_string(),
                reason: "renderer returned no markup".to_string(),
            });
        }
        Ok(markup)
    }
}

pub struct RenderedPageConnector {
    renderer: Arc<dyn PageRenderer>,
}

impl RenderedPageConnector {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    /// External command when one is configured, plain HTTP otherwise.
    pub fn for_descriptor(descriptor: &SourceDescriptor) -> Self {
        let command = descriptor
            .render_command
            .as_deref()
            .and_then(CommandRenderer::from_command_line);

        match command {
            Some(renderer) => Self::new(Arc::new(renderer)),
            None => Self::new(Arc::new(HttpRenderer::new())),
        }
    }
}

#[async_trait]
impl SourceConnector for RenderedPageConnector {
    fn name(&self) -> &str {
        "rendered_page"
    }

    async fn fetch(&self, descriptor: &SourceDescriptor) -> Result<RawDocument> {
        info!(source = %descriptor.id, url = %descriptor.location, "fetching rendered page");

        let markup = self.renderer.render(&descriptor.id, &descriptor.location).await?;
        debug!(source = %descriptor.id, bytes = markup.len(), "page rendered");

        Ok(RawDocument::Markup(markup))
    }
}
