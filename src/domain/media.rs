use std::fmt;

use bytes::Bytes;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

/// Server-issued 64-bit identifier.
///
/// The gallery server emits snowflakes either as JSON numbers or as strings
/// (they overflow a JavaScript number), so both forms are accepted. They are
/// always written back as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snowflake(pub i64);

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(Snowflake)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnowflakeVisitor;

        impl<'de> Visitor<'de> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer id or a string holding one")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Snowflake, E> {
                Ok(Snowflake(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Snowflake, E> {
                i64::try_from(value)
                    .map(Snowflake)
                    .map_err(|_| E::custom("id out of range"))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Snowflake, E> {
                value
                    .parse()
                    .map_err(|err| E::custom(format!("invalid id {:?}: {}", value, err)))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Classifies a MIME type by its top-level type.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let top_level = content_type.split('/').next()?.trim();
        Self::parse(&top_level.to_ascii_lowercase())
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media record as stored by the gallery server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: Snowflake,
    pub user_id: Snowflake,
    #[serde(default)]
    pub album_id: Option<Snowflake>,
    pub file_name: String,
    pub file_type: MediaType,
    pub mime_type: String,
    pub size: i64,
    pub s3_key: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<f32>,
    pub exif_data: Option<serde_json::Value>,
    pub waveform: Option<Vec<f32>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Type-specific shape of a media file.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaDetails {
    Image {
        width: i32,
        height: i32,
        duration: Option<f32>,
    },
    Audio {
        duration: f32,
        waveform: Vec<f32>,
    },
}

impl MediaFile {
    /// Returns `None` when the record lacks the fields its type requires.
    pub fn details(&self) -> Option<MediaDetails> {
        match self.file_type {
            MediaType::Image | MediaType::Video => Some(MediaDetails::Image {
                width: self.width?,
                height: self.height?,
                duration: self.duration,
            }),
            MediaType::Audio => Some(MediaDetails::Audio {
                duration: self.duration?,
                waveform: self.waveform.clone()?,
            }),
        }
    }
}

/// A local file waiting to be uploaded.
#[derive(Debug, Clone, Serialize)]
pub struct FilePayload {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    #[serde(skip)]
    pub bytes: Bytes,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }

    pub fn media_type(&self) -> Option<MediaType> {
        MediaType::from_content_type(&self.content_type)
    }
}

pub fn content_type_from_extension(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "avif" => "image/avif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
