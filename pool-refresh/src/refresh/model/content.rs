//! Persisted content

use serde::{Deserialize, Serialize};

use super::{ContentInfo, Entity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub content_type: String,
    pub label: String,
    pub name: String,
    pub vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arches: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_expiration: Option<i64>,
}

impl Content {
    pub fn from_info(info: &ContentInfo) -> Self {
        Content {
            id: info.id.clone(),
            content_type: info.content_type.clone(),
            label: info.label.clone(),
            name: info.name.clone(),
            vendor: info.vendor.clone(),
            content_url: info.content_url.clone(),
            gpg_url: info.gpg_url.clone(),
            arches: info.arches.clone(),
            required_tags: info.required_tags.clone(),
            release_version: info.release_version.clone(),
            metadata_expiration: info.metadata_expiration,
        }
    }

    pub fn differs_from(&self, info: &ContentInfo) -> bool {
        *self != Content::from_info(info)
    }
}

impl Entity for Content {
    fn entity_id(&self) -> &str {
        &self.id
    }
}
