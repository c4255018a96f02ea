use anyhow::{anyhow, Result};
use axum::http::HeaderValue;
use std::net::SocketAddr;
use std::str::FromStr;
use url::Url;

use crate::domain::media::Snowflake;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub server_url: Url,
    pub session_cookie_name: String,
    pub session_token: Option<String>,
    pub cors_allow_origin: Option<HeaderValue>,
    pub upload_max_bytes: usize,
    pub upload_event_buffer: usize,
    pub upload_album_id: Option<Snowflake>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "127.0.0.1:8787");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let server_url = env_or_err("SERVER_URL")?;
        let server_url =
            Url::parse(&server_url).map_err(|err| anyhow!("invalid SERVER_URL: {}", err))?;

        let upload_event_buffer: usize = env_or_parse("UPLOAD_EVENT_BUFFER", "256")?;
        if upload_event_buffer == 0 {
            return Err(anyhow!("invalid UPLOAD_EVENT_BUFFER: must be greater than 0"));
        }

        let cors_allow_origin = match std::env::var("CORS_ALLOW_ORIGIN") {
            Ok(value) => Some(
                HeaderValue::from_str(&value)
                    .map_err(|err| anyhow!("invalid CORS_ALLOW_ORIGIN: {}", err))?,
            ),
            Err(_) => None,
        };

        let upload_album_id = match std::env::var("UPLOAD_ALBUM_ID") {
            Ok(value) => Some(
                value
                    .parse::<Snowflake>()
                    .map_err(|err| anyhow!("invalid UPLOAD_ALBUM_ID: {}", err))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            http_addr,
            app_mode,
            server_url,
            session_cookie_name: env_or("SESSION_COOKIE_NAME", "session"),
            session_token: std::env::var("SESSION_TOKEN").ok().filter(|v| !v.is_empty()),
            cors_allow_origin,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "104857600")?,
            upload_event_buffer,
            upload_album_id,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
