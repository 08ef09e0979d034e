//! Avatar profile expansion.
//!
//! A one-shot mode (CLI `--profile <address>`) that bypasses the queue:
//! resolve the avatar's wearable and emote pointer sets, fetch the active
//! entities behind them, and push every GLTF through the wearable pipeline
//! in bounded parallel batches.

use crate::entity::{strip_token_id, EntityDefinition, EntityType, Job, ProfileData};
use crate::fetch::FetchError;
use crate::pipeline::{process_wearable_job, PipelineContext};
use crate::engine::EngineApi;
use crate::storage::Storage;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Errors that abort a profile expansion before any processing starts.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("profile {0} has no avatar")]
    NoAvatar(String),
}

/// Outcome of one profile expansion run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProfileSummary {
    pub entities: usize,
    pub gltfs: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    avatars: Vec<AvatarEntry>,
}

#[derive(Debug, Deserialize)]
struct AvatarEntry {
    avatar: AvatarData,
}

#[derive(Debug, Deserialize, Default)]
struct AvatarData {
    #[serde(default)]
    wearables: Vec<String>,
    #[serde(default)]
    emotes: Vec<EmoteEntry>,
}

#[derive(Debug, Deserialize)]
struct EmoteEntry {
    #[serde(default)]
    urn: String,
}

/// Pointer sets extracted from an avatar, split by entity type.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PointerSets {
    pub wearables: Vec<String>,
    pub emotes: Vec<String>,
}

impl PointerSets {
    /// All pointers, wearables first.
    pub fn all(&self) -> Vec<String> {
        let mut pointers = self.wearables.clone();
        pointers.extend(self.emotes.iter().cloned());
        pointers
    }
}

/// Build the disjoint pointer sets for an avatar.
///
/// Base wearables and base emotes ship with every client and are never
/// optimized; collections-v2 token ids are stripped so the pointers match
/// what the content server indexes.
pub fn build_pointer_sets(wearable_urns: &[String], emote_urns: &[String]) -> PointerSets {
    let mut seen = HashSet::new();
    let mut sets = PointerSets::default();

    for urn in wearable_urns {
        if urn.contains("base-avatars") {
            continue;
        }
        let pointer = strip_token_id(urn);
        if seen.insert(pointer.clone()) {
            sets.wearables.push(pointer);
        }
    }

    for urn in emote_urns {
        if urn.is_empty() || urn.contains("base-emotes") {
            continue;
        }
        let pointer = strip_token_id(urn);
        if seen.insert(pointer.clone()) {
            sets.emotes.push(pointer);
        }
    }

    sets
}

/// Run the full profile expansion for one avatar address.
pub async fn expand_profile<E, S>(
    ctx: &PipelineContext<E, S>,
    address: &str,
) -> Result<ProfileSummary, ProfileError>
where
    E: EngineApi,
    S: Storage,
{
    let profile_url = format!(
        "{}/profiles/{}",
        ctx.settings.lambdas_url.trim_end_matches('/'),
        address
    );
    let profile: ProfileResponse = ctx.fetcher.fetch_json(&profile_url).await?;
    let avatar = profile
        .avatars
        .into_iter()
        .next()
        .map(|entry| entry.avatar)
        .ok_or_else(|| ProfileError::NoAvatar(address.to_string()))?;

    let emote_urns: Vec<String> = avatar.emotes.into_iter().map(|e| e.urn).collect();
    let sets = build_pointer_sets(&avatar.wearables, &emote_urns);
    let pointers = sets.all();
    if pointers.is_empty() {
        info!(address, "profile has no optimizable pointers");
        return Ok(ProfileSummary::default());
    }

    let active_url = format!(
        "{}/entities/active",
        ctx.settings.content_server_url.trim_end_matches('/')
    );
    let entities: Vec<EntityDefinition> = ctx
        .fetcher
        .post_json(&active_url, &json!({ "pointers": pointers }))
        .await?;

    info!(
        address,
        pointers = sets.wearables.len() + sets.emotes.len(),
        entities = entities.len(),
        "expanding profile"
    );

    let emote_pointers: HashSet<&String> = sets.emotes.iter().collect();
    let contents_base =
        PipelineContext::<E, S>::contents_base(&ctx.settings.content_server_url);

    // One job per GLTF, carrying the resolved content verbatim so the
    // wearable pipeline skips its own fetch.
    let mut jobs = Vec::new();
    for entity in &entities {
        let entity_type = if entity
            .pointers
            .iter()
            .any(|pointer| emote_pointers.contains(pointer))
        {
            EntityType::Emote
        } else {
            EntityType::Wearable
        };

        for gltf in entity.gltf_entries() {
            let mut job = Job::new(
                &entity.id,
                entity_type,
                &ctx.settings.content_server_url,
            );
            job.profile_data = Some(ProfileData {
                gltf_hash: gltf.hash.clone(),
                gltf_file: gltf.file.clone(),
                content_mapping: entity.content_mapping(),
                content_base_url: contents_base.clone(),
            });
            jobs.push(job);
        }
    }

    let mut summary = ProfileSummary {
        entities: entities.len(),
        gltfs: jobs.len(),
        ..ProfileSummary::default()
    };

    for batch in jobs.chunks(ctx.settings.profile_concurrency.max(1)) {
        let mut tasks = JoinSet::new();
        for job in batch {
            let ctx = ctx.clone();
            let job = job.clone();
            tasks.spawn(async move {
                let report = process_wearable_job(&ctx, &job).await;
                (job.entity_id, report.result.success)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, true)) => summary.successful += 1,
                Ok((entity_id, false)) => {
                    warn!(entity_id = %entity_id, "profile GLTF failed");
                    summary.failed += 1;
                }
                Err(join_error) => {
                    warn!(error = %join_error, "profile task panicked");
                    summary.failed += 1;
                }
            }
        }
    }

    info!(
        address,
        gltfs = summary.gltfs,
        successful = summary.successful,
        failed = summary.failed,
        "profile expansion finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_sets_exclude_base_collections() {
        let wearables = vec![
            "urn:decentraland:off-chain:base-avatars:eyes_00".to_string(),
            "urn:decentraland:matic:collections-v2:0xabc:1:42".to_string(),
            "urn:decentraland:matic:collections-v2:0xdef:2".to_string(),
        ];
        let emotes = vec![
            "urn:decentraland:off-chain:base-emotes:wave".to_string(),
            "urn:decentraland:matic:collections-v2:0x123:7:999".to_string(),
        ];

        let sets = build_pointer_sets(&wearables, &emotes);
        assert_eq!(
            sets.wearables,
            vec![
                "urn:decentraland:matic:collections-v2:0xabc:1",
                "urn:decentraland:matic:collections-v2:0xdef:2",
            ]
        );
        assert_eq!(
            sets.emotes,
            vec!["urn:decentraland:matic:collections-v2:0x123:7"]
        );
    }

    #[test]
    fn test_pointer_sets_dedupe_after_stripping() {
        let wearables = vec![
            "urn:decentraland:matic:collections-v2:0xabc:1:42".to_string(),
            "urn:decentraland:matic:collections-v2:0xabc:1:43".to_string(),
        ];
        let sets = build_pointer_sets(&wearables, &[]);
        assert_eq!(sets.wearables.len(), 1);
    }

    #[test]
    fn test_pointer_sets_skip_empty_emote_urns() {
        let emotes = vec![String::new()];
        let sets = build_pointer_sets(&[], &emotes);
        assert!(sets.emotes.is_empty());
    }

    #[test]
    fn test_all_orders_wearables_first() {
        let sets = PointerSets {
            wearables: vec!["w1".to_string()],
            emotes: vec!["e1".to_string()],
        };
        assert_eq!(sets.all(), vec!["w1", "e1"]);
    }

    #[test]
    fn test_profile_response_tolerates_missing_fields() {
        let json = r#"{"avatars": [{"avatar": {}}]}"#;
        let profile: ProfileResponse = serde_json::from_str(json).unwrap();
        assert_eq!(profile.avatars.len(), 1);
        assert!(profile.avatars[0].avatar.wearables.is_empty());
    }
}
