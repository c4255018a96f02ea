use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

use crate::config::AppConfig;
use crate::domain::bucket::{month_window, TimeBucket};
use crate::domain::media::{FilePayload, MediaFile, MediaType, Snowflake};
use crate::infra::api::{ApiError, MediaApi};

/// [`MediaApi`] over the gallery server's JSON endpoints.
///
/// Requests carry the session cookie when one is configured. There are no
/// retries and no timeouts: a request runs until the server answers or the
/// connection fails.
#[derive(Debug, Clone)]
pub struct HttpMediaApi {
    client: reqwest::Client,
    api_base: Url,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpMediaApi {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_session(
            &config.server_url,
            &config.session_cookie_name,
            config.session_token.as_deref(),
        )
    }

    pub fn with_session(
        server_url: &Url,
        cookie_name: &str,
        session_token: Option<&str>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = session_token {
            let cookie = HeaderValue::from_str(&format!("{}={}", cookie_name, token))
                .map_err(|err| anyhow!("invalid session cookie: {}", err))?;
            headers.insert(COOKIE, cookie);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| anyhow!("failed to build HTTP client: {}", err))?;

        Ok(Self {
            client,
            api_base: api_base(server_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.api_base
            .join(path)
            .map_err(|err| ApiError::Request(format!("invalid endpoint {}: {}", path, err)))
    }
}

#[async_trait]
impl MediaApi for HttpMediaApi {
    async fn upload(
        &self,
        file: &FilePayload,
        album_id: Option<Snowflake>,
    ) -> Result<MediaFile, ApiError> {
        let data = match album_id {
            Some(album_id) => json!({ "albumId": album_id }),
            None => json!({}),
        };
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("data", data.to_string());

        debug!(file = %file.name, bytes = file.size, "uploading file");
        let response = self
            .client
            .post(self.endpoint("files/upload")?)
            .multipart(form)
            .send()
            .await?;

        decode(response).await
    }

    async fn list_buckets(&self, media_type: MediaType) -> Result<Vec<TimeBucket>, ApiError> {
        let response = self
            .client
            .get(self.endpoint("files/buckets")?)
            .query(&[("type", media_type.as_str())])
            .send()
            .await?;

        decode(response).await
    }

    async fn list_bucket_files(
        &self,
        media_type: MediaType,
        date: OffsetDateTime,
    ) -> Result<Vec<MediaFile>, ApiError> {
        let date_param = date
            .format(&Rfc3339)
            .map_err(|err| ApiError::Request(format!("invalid bucket date: {}", err)))?;

        if let Ok(window) = month_window(date) {
            debug!(
                media_type = %media_type,
                start = %window.start,
                end = %window.end,
                "fetching bucket files"
            );
        }

        let response = self
            .client
            .get(self.endpoint("files/buckets/files")?)
            .query(&[("type", media_type.as_str()), ("date", date_param.as_str())])
            .send()
            .await?;

        decode(response).await
    }
}

fn api_base(server_url: &Url) -> Result<Url> {
    let mut base = server_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("api/")
        .map_err(|err| anyhow!("invalid SERVER_URL: {}", err))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error,
            Err(_) if body.trim().is_empty() => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => body.trim().to_string(),
        };
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| ApiError::Decode(err.to_string()))
}
