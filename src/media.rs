//! Media upload, resolution, and download.

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::PixaiClient;
use crate::error::{PixaiError, Result};
use crate::graphql;
use crate::types::{GenerationTask, MediaRecord, MediaType, TaskMedia, TaskStatus};

/// Where the upload bytes come from. Resolved once at the entry point.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Bytes already live in storage; only register the record.
    Descriptor(MediaDescriptor),
    /// In-memory file contents.
    File(MediaFile),
    /// Fetch the bytes from a remote URL first.
    Url(String),
}

impl UploadSource {
    /// Upload from an in-memory file.
    pub fn file(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        UploadSource::File(MediaFile {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
        })
    }

    /// Upload by fetching a remote URL.
    pub fn url(url: impl Into<String>) -> Self {
        UploadSource::Url(url.into())
    }

    /// Register an already-transferred upload.
    pub fn descriptor(external_id: impl Into<String>, media_type: MediaType) -> Self {
        UploadSource::Descriptor(MediaDescriptor {
            external_id: external_id.into(),
            media_type,
        })
    }
}

/// An upload whose byte transfer already happened out of band.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub external_id: String,
    pub media_type: MediaType,
}

/// An in-memory file to upload.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Storage backend the server picked for an upload.
///
/// Direct-storage destinations take the raw bytes with a `PUT`; everything
/// else takes a multipart `POST` with a `file` form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadProvider {
    DirectStorage,
    #[default]
    #[serde(other)]
    Form,
}

/// Pre-signed upload destination issued by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub external_id: String,
    pub upload_url: String,
    #[serde(default)]
    pub provider: UploadProvider,
}

fn classify_content_type(content_type: &str) -> Result<MediaType> {
    if content_type.starts_with("image/") {
        Ok(MediaType::Image)
    } else if content_type.starts_with("video/") {
        Ok(MediaType::Video)
    } else {
        Err(PixaiError::UnsupportedMediaType(content_type.to_string()))
    }
}

/// Last non-empty path segment of the URL, or `"file"`.
fn filename_from_url(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("file")
        .to_string()
}

impl PixaiClient {
    // ── Media gateway ───────────────────────────────────────────────

    /// Upload a media item and return its registered record.
    pub async fn upload_media(&self, source: UploadSource) -> Result<MediaRecord> {
        match source {
            UploadSource::Descriptor(descriptor) => {
                self.register_media(&descriptor.external_id, descriptor.media_type)
                    .await
            }
            UploadSource::File(file) => self.upload_file(file).await,
            UploadSource::Url(url) => {
                let file = self.fetch_remote(&url).await?;
                self.upload_file(file).await
            }
        }
    }

    /// Resolve a completed task's outputs into media records.
    ///
    /// Batched outputs are fetched concurrently and returned in batch
    /// order; if any member fetch fails the whole call fails.
    pub async fn get_media_from_task(&self, task: &GenerationTask) -> Result<TaskMedia> {
        if task.status != TaskStatus::Completed {
            return Err(PixaiError::TaskNotCompleted {
                id: task.id.clone(),
                status: task.status,
            });
        }

        let outputs = task
            .outputs
            .as_ref()
            .ok_or_else(|| PixaiError::api(format!("completed task {} has no outputs", task.id)))?;

        if let Some(batch) = &outputs.batch {
            let ids: Vec<&str> = batch
                .iter()
                .filter_map(|entry| entry.media_id.as_deref())
                .collect();
            let records =
                futures_util::future::try_join_all(ids.iter().map(|id| self.get_media_by_id(id)))
                    .await?;
            return Ok(TaskMedia::Batch(records));
        }

        match &outputs.media_id {
            Some(id) => Ok(TaskMedia::Single(self.get_media_by_id(id).await?)),
            None => Err(PixaiError::api(format!(
                "completed task {} references no media",
                task.id
            ))),
        }
    }

    /// Fetch one media record by id.
    pub async fn get_media_by_id(&self, id: &str) -> Result<MediaRecord> {
        let data: MediaData = self
            .send(graphql::GET_MEDIA_BY_ID, json!({ "id": id }))
            .await?;
        data.media
            .ok_or_else(|| PixaiError::api(format!("media {} not found", id)))
    }

    /// Download the bytes behind a record's public URL.
    pub async fn download_media(&self, media: &MediaRecord) -> Result<Vec<u8>> {
        let url = media.public_url().ok_or_else(|| PixaiError::MissingPublicUrl {
            id: media.id.clone(),
        })?;

        let response = self
            .http()
            .get(url)
            .send()
            .await
            .map_err(|e| PixaiError::Network {
                context: format!("Failed to download media {}", media.id),
                source: e,
            })?;
        let response = ensure_success(response, "media download failed").await?;

        let bytes = response.bytes().await.map_err(|e| PixaiError::Network {
            context: "Failed to read media bytes".into(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }

    async fn upload_file(&self, file: MediaFile) -> Result<MediaRecord> {
        let media_type = classify_content_type(&file.content_type)?;

        let data: CreateUploadMediaData = self
            .send(
                graphql::CREATE_UPLOAD_MEDIA,
                json!({ "type": media_type.to_string() }),
            )
            .await?;
        let target = data
            .target
            .ok_or_else(|| PixaiError::api("server did not return an upload destination"))?;

        match target.provider {
            UploadProvider::DirectStorage => {
                let response = self
                    .http()
                    .put(&target.upload_url)
                    .header(CONTENT_TYPE, &file.content_type)
                    .body(file.bytes)
                    .send()
                    .await
                    .map_err(|e| PixaiError::Network {
                        context: format!("Failed to upload {} bytes", file.filename),
                        source: e,
                    })?;
                ensure_success(response, "media upload failed").await?;
            }
            UploadProvider::Form => {
                let part = reqwest::multipart::Part::bytes(file.bytes)
                    .file_name(file.filename.clone())
                    .mime_str(&file.content_type)
                    .map_err(|e| PixaiError::Network {
                        context: format!("Invalid content type {}", file.content_type),
                        source: e,
                    })?;
                let form = reqwest::multipart::Form::new().part("file", part);
                let response = self
                    .http()
                    .post(&target.upload_url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| PixaiError::Network {
                        context: format!("Failed to upload {}", file.filename),
                        source: e,
                    })?;
                ensure_success(response, "media upload failed").await?;
            }
        }

        self.register_media(&target.external_id, media_type).await
    }

    async fn register_media(&self, external_id: &str, media_type: MediaType) -> Result<MediaRecord> {
        let data: RegisterMediaData = self
            .send(
                graphql::REGISTER_MEDIA,
                json!({ "externalId": external_id, "type": media_type.to_string() }),
            )
            .await?;
        data.media
            .ok_or_else(|| PixaiError::api("server did not return the registered media record"))
    }

    async fn fetch_remote(&self, url: &str) -> Result<MediaFile> {
        let response = self
            .http()
            .get(url)
            .send()
            .await
            .map_err(|e| PixaiError::Network {
                context: format!("Failed to fetch media from {}", url),
                source: e,
            })?;
        let response = ensure_success(response, "remote media fetch failed").await?;

        let filename = filename_from_url(response.url());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response.bytes().await.map_err(|e| PixaiError::Network {
            context: "Failed to read remote media bytes".into(),
            source: e,
        })?;

        Ok(MediaFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

async fn ensure_success(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(PixaiError::Api {
        message: format!("{} (HTTP {})", context, status),
        errors: Vec::new(),
        status: Some(status),
        body: Some(body),
    })
}

#[derive(Debug, Deserialize)]
struct MediaData {
    media: Option<MediaRecord>,
}

#[derive(Debug, Deserialize)]
struct CreateUploadMediaData {
    #[serde(rename = "createUploadMedia")]
    target: Option<UploadTarget>,
}

#[derive(Debug, Deserialize)]
struct RegisterMediaData {
    #[serde(rename = "registerMedia")]
    media: Option<MediaRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_content_type() {
        assert_eq!(classify_content_type("image/png").unwrap(), MediaType::Image);
        assert_eq!(
            classify_content_type("video/mp4").unwrap(),
            MediaType::Video
        );
        assert!(matches!(
            classify_content_type("application/pdf"),
            Err(PixaiError::UnsupportedMediaType(t)) if t == "application/pdf"
        ));
    }

    #[test]
    fn test_filename_from_url() {
        let url = reqwest::Url::parse("https://cdn.example/images/cat.png?sig=abc").unwrap();
        assert_eq!(filename_from_url(&url), "cat.png");

        let trailing = reqwest::Url::parse("https://cdn.example/images/").unwrap();
        assert_eq!(filename_from_url(&trailing), "images");

        let bare = reqwest::Url::parse("https://cdn.example/").unwrap();
        assert_eq!(filename_from_url(&bare), "file");
    }

    #[test]
    fn test_provider_parsing() {
        let direct: UploadProvider = serde_json::from_str(r#""direct-storage""#).unwrap();
        assert_eq!(direct, UploadProvider::DirectStorage);

        let other: UploadProvider = serde_json::from_str(r#""cdn-77""#).unwrap();
        assert_eq!(other, UploadProvider::Form);
    }

    #[test]
    fn test_upload_target_defaults_to_form_provider() {
        let target: UploadTarget = serde_json::from_str(
            r#"{"externalId": "ext-1", "uploadUrl": "https://upload.example/x"}"#,
        )
        .unwrap();
        assert_eq!(target.provider, UploadProvider::Form);
        assert_eq!(target.external_id, "ext-1");
    }

    #[tokio::test]
    async fn test_get_media_from_task_requires_completion() {
        let client = PixaiClient::new("key");
        let task = GenerationTask {
            id: "t-1".into(),
            status: TaskStatus::Running,
            outputs: None,
        };
        match client.get_media_from_task(&task).await {
            Err(PixaiError::TaskNotCompleted { id, status }) => {
                assert_eq!(id, "t-1");
                assert_eq!(status, TaskStatus::Running);
            }
            other => panic!("expected TaskNotCompleted, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_download_media_requires_public_url() {
        let client = PixaiClient::new("key");
        let media = MediaRecord {
            id: "m-1".into(),
            urls: vec![crate::types::MediaUrl {
                variant: "thumbnail".into(),
                url: "https://cdn.example/t.png".into(),
            }],
            media_type: Some(MediaType::Image),
        };
        match client.download_media(&media).await {
            Err(PixaiError::MissingPublicUrl { id }) => assert_eq!(id, "m-1"),
            other => panic!("expected MissingPublicUrl, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_unsupported_upload_content_type_fails_before_any_request() {
        let client = PixaiClient::new("key");
        let result = client
            .upload_media(UploadSource::file("doc.pdf", "application/pdf", vec![1, 2]))
            .await;
        assert!(matches!(
            result,
            Err(PixaiError::UnsupportedMediaType(t)) if t == "application/pdf"
        ));
    }
}
