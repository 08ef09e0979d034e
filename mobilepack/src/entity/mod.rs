//! Deployment entity wire types.
//!
//! These are the shapes exchanged with the queue producer and the content
//! server. Field names follow the producer's camelCase wire format; the
//! structs use the crate's snake_case internally via serde renames.

mod pointer;

pub use pointer::{resolve_entity_id, strip_token_id, EntityIdKind, PointerError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of deployment an entity id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Scene,
    Wearable,
    Emote,
}

impl Default for EntityType {
    fn default() -> Self {
        Self::Scene
    }
}

impl EntityType {
    /// Name used in logs, metrics labels and asset requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Wearable => "wearable",
            Self::Emote => "emote",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployment job as published to (and consumed from) the task queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Content hash, comma-separated pointer, or DNS-style world name.
    #[serde(rename = "entityId")]
    pub entity_id: String,

    /// Deployment kind; producers omit it for scenes.
    #[serde(rename = "entityType", default)]
    pub entity_type: EntityType,

    /// Ordered content server base URLs; the first element is used.
    #[serde(rename = "contentServerUrls", default)]
    pub content_server_urls: Vec<String>,

    /// Attachment used by the profile expansion path.
    #[serde(rename = "_profileData", default, skip_serializing_if = "Option::is_none")]
    pub profile_data: Option<ProfileData>,
}

impl Job {
    /// Create a queue job for an entity with the given content server.
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        content_server_url: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type,
            content_server_urls: vec![content_server_url.into()],
            profile_data: None,
        }
    }

    /// First configured content server, if any.
    pub fn content_server(&self) -> Option<&str> {
        self.content_server_urls.first().map(String::as_str)
    }
}

/// Pre-resolved GLTF attachment carried by profile-expansion jobs.
///
/// When present, the wearable pipeline skips the content-server fetch and
/// uses these values verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    #[serde(rename = "gltfHash")]
    pub gltf_hash: String,

    #[serde(rename = "gltfFile")]
    pub gltf_file: String,

    #[serde(rename = "contentMapping")]
    pub content_mapping: HashMap<String, String>,

    #[serde(rename = "contentBaseUrl")]
    pub content_base_url: String,
}

/// One file of an entity's content, as served by the content server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub file: String,
    pub hash: String,
    /// Byte size when the content server reports it; used for validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// An entity definition fetched from `{content}/contents/{entityId}` or
/// `{content}/entities/active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub id: String,
    #[serde(default)]
    pub pointers: Vec<String>,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
}

impl EntityDefinition {
    /// All content entries ending in `.glb` or `.gltf` (case-insensitive).
    pub fn gltf_entries(&self) -> Vec<&ContentEntry> {
        self.content
            .iter()
            .filter(|entry| {
                let lower = entry.file.to_ascii_lowercase();
                lower.ends_with(".glb") || lower.ends_with(".gltf")
            })
            .collect()
    }

    /// Content mapping table `{file -> hash}` for engine requests.
    pub fn content_mapping(&self) -> HashMap<String, String> {
        self.content
            .iter()
            .map(|entry| (entry.file.clone(), entry.hash.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_deserializes_wire_format() {
        let json = r#"{
            "entityId": "bafybeihash",
            "entityType": "wearable",
            "contentServerUrls": ["https://peer.decentraland.org/content"]
        }"#;

        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.entity_id, "bafybeihash");
        assert_eq!(job.entity_type, EntityType::Wearable);
        assert_eq!(
            job.content_server(),
            Some("https://peer.decentraland.org/content")
        );
        assert!(job.profile_data.is_none());
    }

    #[test]
    fn test_job_entity_type_defaults_to_scene() {
        let json = r#"{"entityId": "bafy", "contentServerUrls": []}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.entity_type, EntityType::Scene);
        assert_eq!(job.content_server(), None);
    }

    #[test]
    fn test_job_round_trips_profile_data() {
        let mut mapping = HashMap::new();
        mapping.insert("model.glb".to_string(), "bafymodel".to_string());

        let mut job = Job::new("bafy", EntityType::Emote, "https://content");
        job.profile_data = Some(ProfileData {
            gltf_hash: "bafymodel".to_string(),
            gltf_file: "model.glb".to_string(),
            content_mapping: mapping,
            content_base_url: "https://content/contents/".to_string(),
        });

        let encoded = serde_json::to_string(&job).unwrap();
        assert!(encoded.contains("\"_profileData\""));
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_gltf_entries_filters_extensions() {
        let entity = EntityDefinition {
            id: "bafy".to_string(),
            pointers: vec![],
            content: vec![
                ContentEntry {
                    file: "model.GLB".to_string(),
                    hash: "h1".to_string(),
                    size: None,
                },
                ContentEntry {
                    file: "thumbnail.png".to_string(),
                    hash: "h2".to_string(),
                    size: None,
                },
                ContentEntry {
                    file: "anim.gltf".to_string(),
                    hash: "h3".to_string(),
                    size: None,
                },
            ],
        };

        let gltfs = entity.gltf_entries();
        assert_eq!(gltfs.len(), 2);
        assert_eq!(gltfs[0].hash, "h1");
        assert_eq!(gltfs[1].hash, "h3");
    }

    #[test]
    fn test_content_mapping_covers_all_files() {
        let entity = EntityDefinition {
            id: "bafy".to_string(),
            pointers: vec![],
            content: vec![
                ContentEntry {
                    file: "a.glb".to_string(),
                    hash: "h1".to_string(),
                    size: None,
                },
                ContentEntry {
                    file: "b.png".to_string(),
                    hash: "h2".to_string(),
                    size: None,
                },
            ],
        };

        let mapping = entity.content_mapping();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["a.glb"], "h1");
        assert_eq!(mapping["b.png"], "h2");
    }
}
