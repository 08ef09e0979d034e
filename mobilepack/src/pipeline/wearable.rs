//! Wearable and emote optimization pipeline.
//!
//! One GLTF per job: resolve the asset (from the content server, or
//! verbatim from a profile attachment), submit a single-asset batch,
//! wait, upload `{gltfHash}-mobile.zip`.

use super::context::PipelineContext;
use super::report::ProcessReport;
use super::PipelineError;
use crate::engine::{
    AssetKind, AssetRequest, BatchState, EngineApi, ProcessAssetsRequest,
};
use crate::entity::{EntityDefinition, EntityType, Job};
use crate::storage::Storage;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Resolved GLTF input for one wearable/emote job.
struct GltfSource {
    hash: String,
    file: String,
    content_mapping: HashMap<String, String>,
    content_base_url: String,
}

/// Run the wearable/emote pipeline for one job.
///
/// Always returns a finished report, persisted to storage before
/// returning.
pub async fn process_wearable_job<E, S>(ctx: &PipelineContext<E, S>, job: &Job) -> ProcessReport
where
    E: EngineApi,
    S: Storage,
{
    let mut report = ProcessReport::new(
        &job.entity_id,
        job.entity_type,
        job.content_server().unwrap_or_default(),
    );

    if let Err(error) = run_wearable(ctx, job, &mut report).await {
        warn!(entity_id = %job.entity_id, error = %error, "wearable pipeline failed");
        report.record_error(error.to_string());
        report.finish(false);
    }

    report
        .write_to_storage(ctx.storage.as_ref(), &ctx.settings.tmp_dir)
        .await;
    report
}

async fn run_wearable<E, S>(
    ctx: &PipelineContext<E, S>,
    job: &Job,
    report: &mut ProcessReport,
) -> Result<(), PipelineError>
where
    E: EngineApi,
    S: Storage,
{
    let source = match resolve_gltf(ctx, job).await? {
        Some(source) => source,
        None => {
            info!(entity_id = %job.entity_id, "entity has no GLTF content");
            report.finish(true);
            return Ok(());
        }
    };
    debug!(entity_id = %job.entity_id, gltf = %source.file, hash = %source.hash, "optimizing GLTF");

    let kind = match job.entity_type {
        EntityType::Emote => AssetKind::Emote,
        _ => AssetKind::Wearable,
    };

    report.set_asset_total(1);
    ctx.reporter.set_step("optimizing", 20.0);

    let request = ProcessAssetsRequest {
        output_hash: Some(source.hash.clone()),
        assets: vec![AssetRequest {
            url: format!("{}{}", source.content_base_url, source.hash),
            kind,
            hash: source.hash.clone(),
            base_url: source.content_base_url.clone(),
            content_mapping: source.content_mapping,
        }],
    };

    let submission = ctx.engine.process_assets(&request).await?;
    report.set_batch_id(&submission.batch_id);

    let status = ctx
        .engine
        .wait_for_completion(&submission.batch_id, ctx.batch_timeout)
        .await?;

    match (status.status, status.zip_path) {
        (BatchState::Completed, Some(zip_path)) => {
            let key = format!("{}-mobile.zip", source.hash);
            match ctx.storage.store(&key, Path::new(&zip_path)).await {
                Ok(()) => {
                    report.add_zip_key(key);
                    report.mark_asset_success();
                    report.finish(true);
                }
                Err(error) => {
                    report.record_error(format!("zip upload: {error}"));
                    report.mark_asset_failure();
                    report.finish(false);
                }
            }
            let _ = tokio::fs::remove_file(&zip_path).await;
            Ok(())
        }
        (BatchState::Completed, None) => Err(PipelineError::MissingZip {
            batch_id: submission.batch_id,
        }),
        (_, _) => Err(PipelineError::BatchFailed {
            batch_id: submission.batch_id,
            message: status.error.unwrap_or_else(|| "unknown".to_string()),
        }),
    }
}

/// Resolve the GLTF to optimize.
///
/// Profile-attached jobs carry everything verbatim; standard jobs fetch
/// the entity definition and take the first GLTF. `None` means the entity
/// has no GLTF content, which is a success with zero assets.
async fn resolve_gltf<E, S>(
    ctx: &PipelineContext<E, S>,
    job: &Job,
) -> Result<Option<GltfSource>, PipelineError>
where
    E: EngineApi,
    S: Storage,
{
    if let Some(profile) = &job.profile_data {
        return Ok(Some(GltfSource {
            hash: profile.gltf_hash.clone(),
            file: profile.gltf_file.clone(),
            content_mapping: profile.content_mapping.clone(),
            content_base_url: profile.content_base_url.clone(),
        }));
    }

    let content_server = job
        .content_server()
        .ok_or(PipelineError::MissingContentServer)?;
    let url = format!(
        "{}/contents/{}",
        content_server.trim_end_matches('/'),
        job.entity_id
    );
    let entity: EntityDefinition = ctx.fetcher.fetch_json(&url).await?;

    let Some(first_gltf) = entity.gltf_entries().into_iter().next() else {
        return Ok(None);
    };

    Ok(Some(GltfSource {
        hash: first_gltf.hash.clone(),
        file: first_gltf.file.clone(),
        content_mapping: entity.content_mapping(),
        content_base_url: PipelineContext::<E, S>::contents_base(content_server),
    }))
}
