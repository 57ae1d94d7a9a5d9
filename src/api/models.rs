use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::{CloudcastKey, CloudcastRecord, UserRecord};

pub const DEFAULT_BASE_URL: &str = "https://api.mixcloud.com";
const PROFILE_BASE_URL: &str = "https://www.mixcloud.com";

/// Every catalog response: a `data` array, optional paging, or an error object.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub data: Option<Vec<Value>>,
    pub paging: Option<Paging>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type", default = "unknown_error_type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

fn unknown_error_type() -> String {
    "UnknownError".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pictures {
    pub thumbnail: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

impl Pictures {
    fn preferred(self) -> Option<String> {
        self.medium.or(self.thumbnail).or(self.large)
    }
}

/// One entry of `/search/?type=user`
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub name: String,
    pub url: Option<String>,
    #[serde(default)]
    pub pictures: Pictures,
}

impl UserEntry {
    /// `None` when a required field is blank.
    pub fn into_record(self) -> Option<UserRecord> {
        let username = self.username.trim().to_string();
        let display_name = self.name.trim().to_string();
        if username.is_empty() || display_name.is_empty() {
            return None;
        }

        Some(UserRecord {
            profile_url: self
                .url
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| format!("{PROFILE_BASE_URL}/{username}/")),
            avatar_url: self.pictures.preferred(),
            username,
            display_name,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerEntry {
    pub username: String,
}

/// One entry of `/{username}/cloudcasts/`
#[derive(Debug, Clone, Deserialize)]
pub struct CloudcastEntry {
    pub key: Option<String>,
    pub name: String,
    pub url: String,
    pub slug: String,
    pub audio_length: Option<u64>,
    pub created_time: Option<String>,
    #[serde(default)]
    pub pictures: Pictures,
    pub user: Option<OwnerEntry>,
}

impl CloudcastEntry {
    pub fn into_record(self, listed_user: &str) -> Option<CloudcastRecord> {
        let title = self.name.trim().to_string();
        let slug = self.slug.trim().to_string();
        let source_url = self.url.trim().to_string();
        if title.is_empty() || slug.is_empty() || source_url.is_empty() {
            return None;
        }

        let owner = self
            .user
            .map(|user| user.username)
            .filter(|username| !username.is_empty())
            .unwrap_or_else(|| listed_user.to_string());

        let key = match self.key.filter(|key| !key.is_empty()) {
            Some(key) => CloudcastKey::new(key),
            None => CloudcastKey::for_slug(&owner, &slug),
        };

        Some(CloudcastRecord {
            key,
            owner,
            slug,
            title,
            duration: self.audio_length.map(Duration::from_secs),
            source_url,
            thumbnail_url: self.pictures.preferred(),
            published: self
                .created_time
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|time| time.with_timezone(&Utc)),
        })
    }
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Upper bound on pages followed for one listing.
    pub max_pages: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_pages: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_entry_without_url_gets_profile_link() {
        let entry: UserEntry =
            serde_json::from_value(json!({"username": "monstercat", "name": "Monstercat"}))
                .unwrap();
        let record = entry.into_record().unwrap();

        assert_eq!(record.username, "monstercat");
        assert_eq!(record.display_name, "Monstercat");
        assert_eq!(record.profile_url, "https://www.mixcloud.com/monstercat/");
        assert_eq!(record.avatar_url, None);
    }

    #[test]
    fn test_blank_username_is_rejected() {
        let entry: UserEntry =
            serde_json::from_value(json!({"username": "  ", "name": "Nobody"})).unwrap();
        assert!(entry.into_record().is_none());
    }

    #[test]
    fn test_cloudcast_entry_maps_optional_fields() {
        let entry: CloudcastEntry = serde_json::from_value(json!({
            "key": "/monstercat/call-of-the-wild-500/",
            "name": "Call of the Wild 500",
            "url": "https://www.mixcloud.com/monstercat/call-of-the-wild-500/",
            "slug": "call-of-the-wild-500",
            "audio_length": 7260,
            "created_time": "2024-03-01T18:00:00Z",
            "pictures": {"medium": "https://thumbnailer.mixcloud.com/m.jpg"},
            "user": {"username": "monstercat", "name": "Monstercat"}
        }))
        .unwrap();

        let record = entry.into_record("someone-else").unwrap();
        assert_eq!(record.owner, "monstercat");
        assert_eq!(record.duration, Some(Duration::from_secs(7260)));
        assert_eq!(
            record.published.map(|t| t.to_rfc3339()),
            Some("2024-03-01T18:00:00+00:00".to_string())
        );
        assert_eq!(
            record.thumbnail_url.as_deref(),
            Some("https://thumbnailer.mixcloud.com/m.jpg")
        );
    }

    #[test]
    fn test_cloudcast_entry_falls_back_to_listed_user() {
        let entry: CloudcastEntry = serde_json::from_value(json!({
            "name": "Sunday Session",
            "url": "https://www.mixcloud.com/dj/sunday-session/",
            "slug": "sunday-session",
            "created_time": "not a date"
        }))
        .unwrap();

        let record = entry.into_record("dj").unwrap();
        assert_eq!(record.key, CloudcastKey::for_slug("dj", "sunday-session"));
        assert_eq!(record.published, None);
    }
}
