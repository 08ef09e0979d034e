//! Scene optimization pipeline.
//!
//! Phase A runs a metadata-only pass over the whole scene and uploads the
//! resulting metadata ZIP. Phase B packs every dependency and standalone
//! asset individually, bounded by the configured bundle concurrency.
//! Per-asset failures are recorded and never abort the batch; the job is
//! successful iff no individual asset failed.

use super::context::PipelineContext;
use super::report::ProcessReport;
use super::validation::validate_entity;
use super::PipelineError;
use crate::engine::{
    BatchState, EngineApi, ProcessSceneRequest, SceneMetadata,
};
use crate::entity::{EntityDefinition, Job};
use crate::storage::Storage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Run the scene pipeline for one job.
///
/// Always returns a finished report, and always persists it to storage
/// before returning - including when the pipeline errored.
pub async fn process_scene_job<E, S>(ctx: &PipelineContext<E, S>, job: &Job) -> ProcessReport
where
    E: EngineApi,
    S: Storage,
{
    let mut report = ProcessReport::new(
        &job.entity_id,
        job.entity_type,
        job.content_server().unwrap_or_default(),
    );

    if let Err(error) = run_scene(ctx, job, &mut report).await {
        warn!(entity_id = %job.entity_id, error = %error, "scene pipeline failed");
        report.record_error(error.to_string());
        report.finish(false);
    }

    report
        .write_to_storage(ctx.storage.as_ref(), &ctx.settings.tmp_dir)
        .await;
    report
}

async fn run_scene<E, S>(
    ctx: &PipelineContext<E, S>,
    job: &Job,
    report: &mut ProcessReport,
) -> Result<(), PipelineError>
where
    E: EngineApi,
    S: Storage,
{
    let scene_hash = job.entity_id.clone();
    let content_server = job
        .content_server()
        .ok_or(PipelineError::MissingContentServer)?;
    let contents_base = PipelineContext::<E, S>::contents_base(content_server);

    // Oversized scenes are rejected before any engine work.
    match fetch_entity(ctx, content_server, &scene_hash).await {
        Ok(entity) => validate_entity(&entity)?,
        Err(error) => {
            // A scene the content server cannot describe can still be
            // optimized; the metadata pass fetches content on its own.
            debug!(entity_id = %scene_hash, error = %error, "skipping validation");
        }
    }

    if !ctx.engine.is_ready().await {
        return Err(PipelineError::EngineNotReady);
    }

    // Phase A: metadata-only pass.
    ctx.reporter.set_step("metadata", 5.0);
    let metadata_request = ProcessSceneRequest {
        scene_hash: scene_hash.clone(),
        content_base_url: contents_base.clone(),
        output_hash: Some(scene_hash.clone()),
        pack_hashes: Some(vec![]),
    };

    let submission = match ctx.engine.process_scene(&metadata_request).await {
        Ok(response) => response,
        Err(error) if error.is_empty_scene() => {
            info!(entity_id = %scene_hash, "scene has no processable assets");
            report.finish(true);
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };
    report.set_batch_id(&submission.batch_id);

    let status = ctx
        .engine
        .wait_for_completion(&submission.batch_id, ctx.batch_timeout)
        .await?;
    if status.status == BatchState::Failed {
        return Err(PipelineError::BatchFailed {
            batch_id: submission.batch_id,
            message: status.error.unwrap_or_else(|| "unknown".to_string()),
        });
    }

    let Some(zip_path) = status.zip_path else {
        info!(entity_id = %scene_hash, "metadata pass produced no archive");
        report.finish(true);
        return Ok(());
    };

    let Some(metadata) = read_scene_metadata(&zip_path, &scene_hash).await? else {
        info!(entity_id = %scene_hash, "metadata archive holds no optimizable assets");
        let _ = tokio::fs::remove_file(&zip_path).await;
        report.finish(true);
        return Ok(());
    };

    // Phase B starts with the metadata ZIP itself.
    let metadata_key = format!("{scene_hash}-mobile.zip");
    match ctx.storage.store(&metadata_key, Path::new(&zip_path)).await {
        Ok(()) => report.add_zip_key(metadata_key),
        Err(error) => report.record_error(format!("metadata zip upload: {error}")),
    }
    let _ = tokio::fs::remove_file(&zip_path).await;

    let assets = metadata.assets_to_pack();
    if assets.is_empty() {
        report.finish(true);
        return Ok(());
    }

    info!(
        entity_id = %scene_hash,
        assets = assets.len(),
        concurrency = ctx.settings.concurrent_bundles,
        "packing individual assets"
    );
    report.set_asset_total(assets.len());

    let total = assets.len();
    let mut packed = 0usize;
    for batch in assets.chunks(ctx.settings.concurrent_bundles.max(1)) {
        let mut tasks = JoinSet::new();
        for hash in batch {
            let engine = Arc::clone(&ctx.engine);
            let storage = Arc::clone(&ctx.storage);
            let request = ProcessSceneRequest {
                scene_hash: scene_hash.clone(),
                content_base_url: contents_base.clone(),
                output_hash: Some(hash.clone()),
                pack_hashes: Some(vec![hash.clone()]),
            };
            let hash = hash.clone();
            let timeout = ctx.batch_timeout;

            tasks.spawn(async move {
                let outcome = pack_single_asset(engine, storage, request, timeout).await;
                (hash, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(zip_key))) => {
                    report.mark_asset_success();
                    report.add_zip_key(zip_key);
                }
                Ok((hash, Err(error))) => {
                    warn!(asset = %hash, error = %error, "asset pack failed");
                    report.mark_asset_failure();
                    report.record_error(format!("asset {hash}: {error}"));
                }
                Err(join_error) => {
                    report.mark_asset_failure();
                    report.record_error(format!("asset task panicked: {join_error}"));
                }
            }
            packed += 1;
            let progress = 20.0 + 80.0 * (packed as f32 / total as f32);
            ctx.reporter.set_step("packing", progress);
        }
    }

    report.finish(report.individual_assets.failed == 0);
    Ok(())
}

/// Pack one asset: submit, wait, upload, clean up the engine's temp file.
async fn pack_single_asset<E, S>(
    engine: Arc<E>,
    storage: Arc<S>,
    request: ProcessSceneRequest,
    timeout: Duration,
) -> Result<String, PipelineError>
where
    E: EngineApi,
    S: Storage,
{
    let hash = request
        .output_hash
        .clone()
        .unwrap_or_else(|| request.scene_hash.clone());

    let submission = engine.process_scene(&request).await?;
    let status = engine
        .wait_for_completion(&submission.batch_id, timeout)
        .await?;

    match (status.status, status.zip_path) {
        (BatchState::Completed, Some(zip_path)) => {
            let key = format!("{hash}-mobile.zip");
            storage.store(&key, Path::new(&zip_path)).await?;
            let _ = tokio::fs::remove_file(&zip_path).await;
            Ok(key)
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

/// Fetch the entity definition backing a scene hash.
async fn fetch_entity<E, S>(
    ctx: &PipelineContext<E, S>,
    content_server: &str,
    entity_id: &str,
) -> Result<EntityDefinition, PipelineError>
where
    E: EngineApi,
    S: Storage,
{
    let url = format!(
        "{}/contents/{}",
        content_server.trim_end_matches('/'),
        entity_id
    );
    Ok(ctx.fetcher.fetch_json(&url).await?)
}

/// Open the metadata ZIP and parse `{scene_hash}-optimized.json`.
///
/// Three outcomes map to the empty-scene contract: an empty archive and a
/// missing entry both yield `None` (success with zero assets); a present
/// entry is parsed as [`SceneMetadata`].
async fn read_scene_metadata(
    zip_path: &str,
    scene_hash: &str,
) -> Result<Option<SceneMetadata>, PipelineError> {
    let zip_path = zip_path.to_string();
    let entry_name = format!("{scene_hash}-optimized.json");

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&zip_path)
            .map_err(|e| PipelineError::Archive(format!("open {zip_path}: {e}")))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| PipelineError::Archive(format!("read {zip_path}: {e}")))?;

        if archive.is_empty() {
            return Ok(None);
        }

        let mut entry = match archive.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(PipelineError::Archive(format!("{entry_name}: {e}"))),
        };

        let mut body = String::new();
        std::io::Read::read_to_string(&mut entry, &mut body)
            .map_err(|e| PipelineError::Archive(format!("read {entry_name}: {e}")))?;

        let metadata: SceneMetadata = serde_json::from_str(&body)
            .map_err(|e| PipelineError::Archive(format!("parse {entry_name}: {e}")))?;
        Ok(Some(metadata))
    })
    .await
    .map_err(|e| PipelineError::Archive(format!("archive task: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_read_metadata_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("meta.zip");
        write_zip(
            &zip_path,
            &[(
                "bafy-optimized.json",
                r#"{"optimizedContent":["h1"],"externalSceneDependencies":{}}"#,
            )],
        );

        let metadata = read_scene_metadata(zip_path.to_str().unwrap(), "bafy")
            .await
            .unwrap()
            .expect("entry present");
        assert_eq!(metadata.optimized_content, vec!["h1"]);
    }

    #[tokio::test]
    async fn test_read_metadata_empty_archive_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("empty.zip");
        write_zip(&zip_path, &[]);

        let metadata = read_scene_metadata(zip_path.to_str().unwrap(), "bafy")
            .await
            .unwrap();
        assert!(metadata.is_none());
    }

    #[tokio::test]
    async fn test_read_metadata_missing_entry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("other.zip");
        write_zip(&zip_path, &[("unrelated.txt", "hello")]);

        let metadata = read_scene_metadata(zip_path.to_str().unwrap(), "bafy")
            .await
            .unwrap();
        assert!(metadata.is_none());
    }

    #[tokio::test]
    async fn test_read_metadata_bad_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("bad.zip");
        write_zip(&zip_path, &[("bafy-optimized.json", "{broken")]);

        let result = read_scene_metadata(zip_path.to_str().unwrap(), "bafy").await;
        assert!(matches!(result, Err(PipelineError::Archive(_))));
    }

    #[tokio::test]
    async fn test_read_metadata_missing_file_errors() {
        let result = read_scene_metadata("/no/such/file.zip", "bafy").await;
        assert!(matches!(result, Err(PipelineError::Archive(_))));
    }
}
