//! Entity id classification and resolution.
//!
//! An operator-supplied entity id can be a content hash (used as-is), a
//! comma-separated grid pointer resolved through the content server, or a
//! DNS-style world name resolved through the world content server.

use super::EntityDefinition;
use crate::fetch::{FetchError, Fetcher};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Default world content server used for DNS-style names.
const WORLDS_URL: &str = "https://worlds-content-server.decentraland.org";

/// Errors raised while resolving an entity id.
#[derive(Debug, Error)]
pub enum PointerError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no active entity for pointer {0:?}")]
    UnknownPointer(String),

    #[error("world {0:?} has no scene urn")]
    EmptyWorld(String),
}

/// What an entity id string refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityIdKind {
    /// A content hash, directly addressable.
    Hash,
    /// A `"x,y"` grid pointer.
    Pointer,
    /// A DNS-style world name such as `name.dcl.eth`.
    WorldName,
}

impl EntityIdKind {
    /// Classify a raw entity id string.
    pub fn classify(value: &str) -> Self {
        if value.contains(',') {
            Self::Pointer
        } else if value.contains('.') {
            Self::WorldName
        } else {
            Self::Hash
        }
    }
}

/// Strip the token-id suffix from a collections-v2 URN.
///
/// Collections-v2 URNs optionally carry a trailing token id; pointers are
/// the URN truncated to 6 colon-delimited segments. Anything else (shorter
/// URNs, off-chain URNs, already-stripped values) is returned unchanged,
/// which makes the operation idempotent.
pub fn strip_token_id(urn: &str) -> String {
    let is_collections_v2 = urn.split(':').any(|segment| segment == "collections-v2");
    if !is_collections_v2 {
        return urn.to_string();
    }

    let segments: Vec<&str> = urn.split(':').collect();
    if segments.len() <= 6 {
        return urn.to_string();
    }
    segments[..6].join(":")
}

#[derive(Debug, Deserialize)]
struct WorldAbout {
    configurations: WorldConfigurations,
}

#[derive(Debug, Deserialize)]
struct WorldConfigurations {
    #[serde(rename = "scenesUrn", default)]
    scenes_urn: Vec<String>,
}

/// Resolve an operator-supplied entity id to a content hash.
///
/// * Hashes are returned unchanged.
/// * Pointers are posted to `{content}/entities/active`; the id of the
///   first returned entity wins.
/// * World names are looked up through the world content server's about
///   endpoint; the hash is the last segment of the first scene URN.
pub async fn resolve_entity_id(
    fetcher: &Fetcher,
    content_server_url: &str,
    entity_id: &str,
) -> Result<String, PointerError> {
    match EntityIdKind::classify(entity_id) {
        EntityIdKind::Hash => Ok(entity_id.to_string()),
        EntityIdKind::Pointer => {
            let url = format!("{}/entities/active", content_server_url.trim_end_matches('/'));
            let entities: Vec<EntityDefinition> = fetcher
                .post_json(&url, &json!({ "pointers": [entity_id] }))
                .await?;

            let entity = entities
                .into_iter()
                .next()
                .ok_or_else(|| PointerError::UnknownPointer(entity_id.to_string()))?;
            debug!(pointer = entity_id, resolved = %entity.id, "resolved pointer");
            Ok(entity.id)
        }
        EntityIdKind::WorldName => {
            let url = format!("{}/world/{}/about", WORLDS_URL, entity_id);
            let about: WorldAbout = fetcher.fetch_json(&url).await?;

            let urn = about
                .configurations
                .scenes_urn
                .into_iter()
                .next()
                .ok_or_else(|| PointerError::EmptyWorld(entity_id.to_string()))?;

            // urn:decentraland:entity:<hash>?... - the hash is the last
            // colon-delimited segment with any query suffix removed.
            let last = urn.rsplit(':').next().unwrap_or(&urn);
            let hash = last.split('?').next().unwrap_or(last);
            debug!(world = entity_id, resolved = hash, "resolved world name");
            Ok(hash.to_string())
        }
    }
}
