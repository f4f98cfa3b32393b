//! Document rendering through a remote HTTP renderer.

use acton_dispatch::{async_trait, Deliver, Job, JobId};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::config::RendererConfig;

/// A document waiting to be rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    /// Template the renderer should use.
    pub template: String,
    /// Data bound into the template.
    #[serde(default)]
    pub data: serde_json::Value,
    /// File name of the rendered document inside the output directory.
    pub output: String,
}

/// Failure of one render attempt.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer answered `429 Too Many Requests`.
    #[error("renderer is rate limiting requests")]
    RateLimited {
        /// Seconds from the `Retry-After` header, if any.
        retry_after: Option<u64>,
    },
    /// The renderer answered with another non-success status.
    #[error("renderer returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The request could not be sent or the response could not be read.
    #[error("render request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The rendered document could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    template: &'a str,
    data: &'a serde_json::Value,
}

/// Renders documents by posting them to a remote renderer and storing the
/// returned bytes on local disk.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
    endpoint: Url,
    output_dir: PathBuf,
    api_key: Option<String>,
}

impl HttpRenderer {
    /// Create a renderer, making sure the output directory exists.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not an http(s) URL, the HTTP client
    /// cannot be built, or the output directory cannot be created.
    pub async fn new(config: &RendererConfig) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("renderer endpoint must be http or https: {endpoint}");
        }

        let client = Client::builder().timeout(config.timeout()).build()?;

        fs::create_dir_all(&config.output_dir).await?;

        info!(
            endpoint = %endpoint,
            output_dir = %config.output_dir.display(),
            "Created HTTP renderer"
        );

        Ok(Self {
            client,
            endpoint,
            output_dir: config.output_dir.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Directory rendered documents are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn render(&self, job: &RenderJob) -> Result<Vec<u8>, RenderError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&RenderRequest {
            template: &job.template,
            data: &job.data,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(RenderError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Write through a `.part` file so readers never see a partial document.
    ///
    /// Each call gets its own temporary file; concurrent renders to the same
    /// name leave whichever finished last.
    async fn store(&self, name: &str, content: &[u8]) -> Result<PathBuf, RenderError> {
        let target = self.output_dir.join(name);
        let partial = self.output_dir.join(format!("{name}.{}.part", JobId::new()));

        fs::write(&partial, content)
            .await
            .map_err(|source| RenderError::Io {
                path: partial.clone(),
                source,
            })?;
        fs::rename(&partial, &target)
            .await
            .map_err(|source| RenderError::Io {
                path: target.clone(),
                source,
            })?;

        Ok(target)
    }
}

/// Check that an output name is a single plain file name.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|n| n == name)
}

#[async_trait]
impl Deliver for HttpRenderer {
    type Payload = RenderJob;
    type Error = RenderError;

    async fn deliver(&self, job: &Job<RenderJob>) -> Result<(), RenderError> {
        let render = job.payload();
        let content = self.render(render).await?;
        let path = self.store(&render.output, &content).await?;

        debug!(
            job_id = %job.id(),
            template = %render.template,
            path = %path.display(),
            bytes = content.len(),
            "Document rendered"
        );
        Ok(())
    }

    fn check(&self, render: &RenderJob) -> Result<(), String> {
        if render.template.trim().is_empty() {
            return Err("template is required".to_string());
        }
        if !is_plain_file_name(&render.output) {
            return Err(format!("output must be a plain file name: {:?}", render.output));
        }
        Ok(())
    }

    fn is_rate_limited(&self, error: &RenderError) -> bool {
        matches!(error, RenderError::RateLimited { .. })
    }
}
