//! Engine API wire types.
//!
//! The engine's HTTP API speaks snake_case JSON; the scene metadata file it
//! packs into the metadata ZIP speaks camelCase. Both are pinned here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of asset submitted for optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Scene,
    Wearable,
    Emote,
    Texture,
}

/// One asset the engine should fetch and optimize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRequest {
    /// Where the engine downloads the asset from.
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    /// Content hash of the original asset.
    pub hash: String,
    /// Content server base for resolving the content mapping.
    pub base_url: String,
    /// Table of `{file-path -> content-hash}` for the asset's dependencies.
    pub content_mapping: HashMap<String, String>,
}

/// Body of `POST /process-scene`.
///
/// An empty `pack_hashes` list selects metadata-only mode; a single-hash
/// list packs exactly that asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSceneRequest {
    pub scene_hash: String,
    pub content_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack_hashes: Option<Vec<String>>,
}

/// Response of `POST /process-scene`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSceneResponse {
    pub batch_id: String,
    #[serde(default)]
    pub output_hash: Option<String>,
    #[serde(default)]
    pub scene_hash: Option<String>,
    #[serde(default)]
    pub total_assets: Option<u32>,
    #[serde(default)]
    pub pack_assets: Option<u32>,
}

/// Body of `POST /process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessAssetsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    pub assets: Vec<AssetRequest>,
}

/// Response of `POST /process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessAssetsResponse {
    pub batch_id: String,
    #[serde(default)]
    pub output_hash: Option<String>,
    #[serde(default)]
    pub jobs: Vec<EngineJobStatus>,
    #[serde(default)]
    pub total: Option<u32>,
}

/// Lifecycle of one optimization batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Processing,
    Packing,
    Completed,
    Failed,
}

impl BatchState {
    /// True for states the engine never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Status of one job inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineJobStatus {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Full status of a batch, from `GET /status/{batch_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: String,
    #[serde(default)]
    pub output_hash: Option<String>,
    pub status: BatchState,
    #[serde(default)]
    pub progress: f32,
    /// Path of the produced ZIP on the shared filesystem, set when packing
    /// produced output.
    #[serde(default)]
    pub zip_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub jobs: Vec<EngineJobStatus>,
}

/// Scene metadata produced by a metadata-only pass.
///
/// Found inside the metadata ZIP as `{scene_hash}-optimized.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneMetadata {
    /// Hashes the engine optimized standalone.
    #[serde(rename = "optimizedContent", default)]
    pub optimized_content: Vec<String>,

    /// GLTFs with external dependencies, keyed by GLTF hash.
    #[serde(rename = "externalSceneDependencies", default)]
    pub external_scene_dependencies: HashMap<String, Vec<String>>,

    #[serde(rename = "originalSizes", default, skip_serializing_if = "Option::is_none")]
    pub original_sizes: Option<HashMap<String, u64>>,

    #[serde(rename = "hashSizeMap", default, skip_serializing_if = "Option::is_none")]
    pub hash_size_map: Option<HashMap<String, u64>>,
}

impl SceneMetadata {
    /// All hashes needing a per-asset pass: dependency GLTFs first, then
    /// standalone optimized content not already covered.
    pub fn assets_to_pack(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self.external_scene_dependencies.keys().cloned().collect();
        hashes.sort();
        for hash in &self.optimized_content {
            if !self.external_scene_dependencies.contains_key(hash) {
                hashes.push(hash.clone());
            }
        }
        hashes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_state_terminality() {
        assert!(!BatchState::Processing.is_terminal());
        assert!(!BatchState::Packing.is_terminal());
        assert!(BatchState::Completed.is_terminal());
        assert!(BatchState::Failed.is_terminal());
    }

    #[test]
    fn test_batch_status_decodes_engine_json() {
        let json = r#"{
            "batch_id": "b-1",
            "output_hash": "bafyout",
            "status": "completed",
            "progress": 1.0,
            "zip_path": "/tmp/engine/b-1.zip",
            "jobs": [{"id": "j1", "status": "done"}]
        }"#;
        let status: BatchStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.status, BatchState::Completed);
        assert_eq!(status.zip_path.as_deref(), Some("/tmp/engine/b-1.zip"));
        assert_eq!(status.jobs.len(), 1);
    }

    #[test]
    fn test_asset_request_uses_type_on_wire() {
        let request = AssetRequest {
            url: "https://content/contents/bafy".to_string(),
            kind: AssetKind::Wearable,
            hash: "bafy".to_string(),
            base_url: "https://content/contents/".to_string(),
            content_mapping: HashMap::new(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"type\":\"wearable\""));
    }

    #[test]
    fn test_metadata_pass_request_keeps_empty_pack_hashes() {
        let request = ProcessSceneRequest {
            scene_hash: "bafy".to_string(),
            content_base_url: "https://content/contents/".to_string(),
            output_hash: Some("bafy".to_string()),
            pack_hashes: Some(vec![]),
        };
        let json = serde_json::to_string(&request).unwrap();
        // The empty list is the metadata-only marker and must serialize.
        assert!(json.contains("\"pack_hashes\":[]"));
    }

    #[test]
    fn test_assets_to_pack_unions_without_duplicates() {
        let mut deps = HashMap::new();
        deps.insert("h1".to_string(), vec!["dep-a".to_string()]);

        let metadata = SceneMetadata {
            optimized_content: vec!["h1".to_string(), "h2".to_string()],
            external_scene_dependencies: deps,
            original_sizes: None,
            hash_size_map: None,
        };

        let assets = metadata.assets_to_pack();
        assert_eq!(assets, vec!["h1".to_string(), "h2".to_string()]);
    }

    #[test]
    fn test_scene_metadata_decodes_camel_case() {
        let json = r#"{
            "optimizedContent": ["a", "b"],
            "externalSceneDependencies": {"a": ["x"]},
            "hashSizeMap": {"a": 123}
        }"#;
        let metadata: SceneMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.optimized_content.len(), 2);
        assert_eq!(metadata.external_scene_dependencies["a"], vec!["x"]);
        assert_eq!(metadata.hash_size_map.unwrap()["a"], 123);
    }
}
