//! Storage-mesh gateway client.
//!
//! Uploads are multipart posts followed by task polling. Downloads stream
//! into `<name>.part` inside the output directory and are renamed only once
//! the body is complete; an abandoned transfer removes its partial file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::MeshConfig;
use crate::error::{IcaError, Result};
use crate::transport::StorageMesh;
use crate::types::DownloadOutcome;

// ═══════════════════════════════════════════════════════════════════════════════
// GATEWAY TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Deserialize)]
struct TaskCreated {
    task_id: String,
}

#[derive(Clone, Debug, Serialize)]
struct DownloadRequest<'a> {
    signer: &'a str,
}

/// Progress of a mesh task.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Deserialize)]
struct TaskStatus {
    status: TaskState,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// HTTP client for the storage-mesh gateway.
pub struct HttpMesh {
    base_url: String,
    poll_interval: Duration,
    http_client: reqwest::Client,
}

impl HttpMesh {
    pub fn new(config: &MeshConfig) -> Result<Self> {
        let base_url = config.require_endpoint()?.to_string();
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IcaError::Transport {
                endpoint: base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            poll_interval: config.poll_interval,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn wait_for_task(&self, path: &str) -> Result<TaskStatus> {
        loop {
            let status: TaskStatus = self.get_json(&self.url(path)).await?;
            match status.status {
                TaskState::Completed => return Ok(status),
                TaskState::Failed => {
                    return Err(IcaError::Transport {
                        endpoint: self.base_url.clone(),
                        reason: status.error.unwrap_or_else(|| "task failed".into()),
                    })
                }
                TaskState::Pending | TaskState::InProgress => {
                    debug!(path, state = ?status.status, "mesh task still running");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn stream_to(&self, url: &str, destination: &Path) -> Result<()> {
        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }

        let mut part = PartFile::create(destination).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport(e.to_string()))?
        {
            part.write(&chunk).await?;
        }
        part.commit().await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HTTP HELPERS
    // ═══════════════════════════════════════════════════════════════════════════

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport(e.to_string()))?;
        self.read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }
        response.json().await.map_err(|e| IcaError::InvalidResponse {
            endpoint: self.base_url.clone(),
            reason: e.to_string(),
        })
    }

    async fn status_error(&self, response: reqwest::Response) -> IcaError {
        let status = response.status();
        if status.as_u16() == 404 {
            return IcaError::NotFound(format!("{} on storage mesh", response.url().path()));
        }
        let body = response.text().await.unwrap_or_default();
        self.transport(format!("HTTP {status}: {body}"))
    }

    fn transport(&self, reason: String) -> IcaError {
        IcaError::Transport {
            endpoint: self.base_url.clone(),
            reason,
        }
    }
}

/// Multipart part that streams `file` from disk.
async fn file_part(file: &Path) -> Result<Part> {
    let handle = tokio::fs::File::open(file)
        .await
        .map_err(|e| IcaError::io(file, e))?;
    let len = handle
        .metadata()
        .await
        .map_err(|e| IcaError::io(file, e))?
        .len();
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin")
        .to_string();
    let body = Body::wrap_stream(ReaderStream::new(handle));
    Ok(Part::stream_with_length(body, len).file_name(file_name))
}

#[async_trait]
impl StorageMesh for HttpMesh {
    async fn upload(&self, action_id: &str, file: &Path, signer: &str) -> Result<String> {
        let upload = async {
            let form = Form::new()
                .text("signer", signer.to_string())
                .part("file", file_part(file).await?);

            let response = self
                .http_client
                .post(self.url(&format!("/actions/{action_id}/upload")))
                .multipart(form)
                .send()
                .await
                .map_err(|e| self.transport(e.to_string()))?;
            let created: TaskCreated = self.read_json(response).await?;

            self.wait_for_task(&format!("/actions/{action_id}/upload/{}/status", created.task_id))
                .await?;
            Ok::<_, IcaError>(created.task_id)
        };
        upload.await.map_err(|e| match e {
            e @ (IcaError::Io { .. } | IcaError::NotFound(_)) => e,
            e => IcaError::Upload(e.to_string()),
        })
    }

    async fn download(
        &self,
        action_id: &str,
        out_dir: &Path,
        signer: &str,
    ) -> Result<DownloadOutcome> {
        let download = async {
            let response = self
                .http_client
                .post(self.url(&format!("/actions/{action_id}/downloads")))
                .json(&DownloadRequest { signer })
                .send()
                .await
                .map_err(|e| self.transport(e.to_string()))?;
            let created: TaskCreated = self.read_json(response).await?;

            let status = self
                .wait_for_task(&format!("/downloads/{}/status", created.task_id))
                .await?;
            let file_name = status
                .file_name
                .as_deref()
                .and_then(|name| Path::new(name).file_name())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(action_id));
            let destination = out_dir.join(file_name);

            self.stream_to(&self.url(&format!("/downloads/{}/file", created.task_id)), &destination)
                .await?;

            Ok::<_, IcaError>(DownloadOutcome {
                action_id: action_id.to_string(),
                task_id: created.task_id,
                output_path: destination.display().to_string(),
            })
        };
        download.await.map_err(|e| match e {
            e @ (IcaError::Io { .. } | IcaError::NotFound(_)) => e,
            e => IcaError::Download(e.to_string()),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARTIAL FILES
// ═══════════════════════════════════════════════════════════════════════════════

/// `<destination>.part`, removed on drop unless committed.
struct PartFile {
    file: Option<tokio::fs::File>,
    part_path: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl PartFile {
    async fn create(destination: &Path) -> Result<Self> {
        let mut part_path = destination.as_os_str().to_owned();
        part_path.push(".part");
        let part_path = PathBuf::from(part_path);
        let file = tokio::fs::File::create(&part_path)
            .await
            .map_err(|e| IcaError::io(&part_path, e))?;
        Ok(Self {
            file: Some(file),
            part_path,
            destination: destination.to_path_buf(),
            committed: false,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk)
                .await
                .map_err(|e| IcaError::io(&self.part_path, e))?;
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| IcaError::io(&self.part_path, e))?;
        }
        tokio::fs::rename(&self.part_path, &self.destination)
            .await
            .map_err(|e| IcaError::io(&self.destination, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.file.take());
            let _ = std::fs::remove_file(&self.part_path);
        }
    }
}
