//! Profile expansion end-to-end against stub lambdas + content servers.

mod common;

use axum::routing::{get, post};
use axum::{Json, Router};
use common::{scripted_context, spawn_server, write_zip, BatchOutcome, ScriptedEngine};
use mobilepack::pipeline::PipelineContext;
use mobilepack::profile::expand_profile;
use std::sync::{Arc, Mutex};

const WEARABLE_BASE: &str = "urn:decentraland:off-chain:base-avatars:eyes_00";
const WEARABLE_1: &str = "urn:decentraland:matic:collections-v2:0xaaa:1:42";
const WEARABLE_1_STRIPPED: &str = "urn:decentraland:matic:collections-v2:0xaaa:1";
const WEARABLE_2: &str = "urn:decentraland:matic:collections-v2:0xbbb:2";
const EMOTE_BASE: &str = "urn:decentraland:off-chain:base-emotes:wave";
const EMOTE_1: &str = "urn:decentraland:matic:collections-v2:0xccc:3:7";
const EMOTE_1_STRIPPED: &str = "urn:decentraland:matic:collections-v2:0xccc:3";

fn profile_body() -> serde_json::Value {
    serde_json::json!({
        "avatars": [{
            "avatar": {
                "wearables": [WEARABLE_BASE, WEARABLE_1, WEARABLE_2],
                "emotes": [{"urn": EMOTE_BASE}, {"urn": EMOTE_1}]
            }
        }]
    })
}

fn active_entities() -> serde_json::Value {
    serde_json::json!([
        {
            "id": "bafyw1",
            "pointers": [WEARABLE_1_STRIPPED],
            "content": [
                {"file": "model.glb", "hash": "WH1"},
                {"file": "thumb.png", "hash": "T1"}
            ]
        },
        {
            "id": "bafyw2",
            "pointers": [WEARABLE_2],
            "content": [{"file": "model.glb", "hash": "WH2"}]
        },
        {
            "id": "bafye1",
            "pointers": [EMOTE_1_STRIPPED],
            "content": [{"file": "emote.glb", "hash": "EH1"}]
        }
    ])
}

/// S6: base collections are filtered, token ids stripped, every GLTF is
/// optimized and uploaded, and the run reports a clean summary.
#[tokio::test]
async fn profile_expansion_processes_every_gltf() {
    let dir = tempfile::tempdir().unwrap();
    let storage_dir = dir.path().join("storage");
    std::fs::create_dir_all(&storage_dir).unwrap();

    let pointer_requests: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&pointer_requests);

    let router = Router::new()
        .route(
            "/lambdas/profiles/{address}",
            get(|| async { Json(profile_body()) }),
        )
        .route(
            "/entities/active",
            post(move |Json(body): Json<serde_json::Value>| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(body);
                    Json(active_entities())
                }
            }),
        );
    let base = spawn_server(router).await;

    // One packed ZIP per GLTF hash.
    let engine = Arc::new(ScriptedEngine::ready());
    for hash in ["WH1", "WH2", "EH1"] {
        let zip_path = dir.path().join(format!("{hash}.zip"));
        write_zip(&zip_path, &[("packed.glb", "bytes")]);
        engine.script(hash, BatchOutcome::CompletedZip(zip_path));
    }

    let ctx = scripted_context(Arc::clone(&engine), &storage_dir, dir.path(), &base);
    let summary = expand_profile(&ctx, "0xABC").await.unwrap();

    assert_eq!(summary.entities, 3);
    assert_eq!(summary.gltfs, 3);
    assert_eq!(summary.successful, 3);
    assert_eq!(summary.failed, 0);

    // Exactly one pointer-set request with the base collections excluded
    // and token ids stripped.
    let recorded = pointer_requests.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0],
        serde_json::json!({
            "pointers": [WEARABLE_1_STRIPPED, WEARABLE_2, EMOTE_1_STRIPPED]
        })
    );
    drop(recorded);

    for hash in ["WH1", "WH2", "EH1"] {
        assert!(
            storage_dir.join(format!("{hash}-mobile.zip")).exists(),
            "{hash}-mobile.zip must be uploaded"
        );
    }

    // The emote entity was submitted as an emote, the wearables as
    // wearables.
    let submissions = engine.asset_submissions.lock().unwrap();
    assert_eq!(submissions.len(), 3);
    for submission in submissions.iter() {
        assert_eq!(submission.assets.len(), 1);
        let asset = &submission.assets[0];
        let expected_kind = if asset.hash == "EH1" { "emote" } else { "wearable" };
        assert_eq!(
            serde_json::to_value(asset.kind).unwrap(),
            serde_json::json!(expected_kind)
        );
    }
}

/// A profile with only base collections does nothing.
#[tokio::test]
async fn base_only_profile_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let storage_dir = dir.path().join("storage");
    std::fs::create_dir_all(&storage_dir).unwrap();

    let router = Router::new().route(
        "/lambdas/profiles/{address}",
        get(|| async {
            Json(serde_json::json!({
                "avatars": [{
                    "avatar": {
                        "wearables": [WEARABLE_BASE],
                        "emotes": [{"urn": EMOTE_BASE}]
                    }
                }]
            }))
        }),
    );
    let base = spawn_server(router).await;

    let engine = Arc::new(ScriptedEngine::ready());
    let ctx = scripted_context(Arc::clone(&engine), &storage_dir, dir.path(), &base);
    let summary = expand_profile(&ctx, "0xDEF").await.unwrap();

    assert_eq!(summary.gltfs, 0);
    assert!(engine.asset_submissions.lock().unwrap().is_empty());
}

/// One failing GLTF is counted and does not stop the rest.
#[tokio::test]
async fn failed_gltf_does_not_abort_expansion() {
    let dir = tempfile::tempdir().unwrap();
    let storage_dir = dir.path().join("storage");
    std::fs::create_dir_all(&storage_dir).unwrap();

    let router = Router::new()
        .route(
            "/lambdas/profiles/{address}",
            get(|| async { Json(profile_body()) }),
        )
        .route(
            "/entities/active",
            post(|| async { Json(active_entities()) }),
        );
    let base = spawn_server(router).await;

    let engine = Arc::new(ScriptedEngine::ready());
    for hash in ["WH1", "EH1"] {
        let zip_path = dir.path().join(format!("{hash}.zip"));
        write_zip(&zip_path, &[("packed.glb", "bytes")]);
        engine.script(hash, BatchOutcome::CompletedZip(zip_path));
    }
    engine.script("WH2", BatchOutcome::Failed("render crashed".to_string()));

    let ctx = scripted_context(Arc::clone(&engine), &storage_dir, dir.path(), &base);
    let summary = expand_profile(&ctx, "0xABC").await.unwrap();

    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert!(storage_dir.join("WH1-mobile.zip").exists());
    assert!(!storage_dir.join("WH2-mobile.zip").exists());
}

/// The wearable pipeline uses the profile attachment verbatim: the asset
/// URL and base URL point at the content server's contents root.
#[tokio::test]
async fn profile_jobs_carry_resolved_content() {
    let dir = tempfile::tempdir().unwrap();
    let storage_dir = dir.path().join("storage");
    std::fs::create_dir_all(&storage_dir).unwrap();

    let router = Router::new()
        .route(
            "/lambdas/profiles/{address}",
            get(|| async {
                Json(serde_json::json!({
                    "avatars": [{"avatar": {
                        "wearables": [WEARABLE_2],
                        "emotes": []
                    }}]
                }))
            }),
        )
        .route(
            "/entities/active",
            post(|| async {
                Json(serde_json::json!([{
                    "id": "bafyw2",
                    "pointers": [WEARABLE_2],
                    "content": [{"file": "model.glb", "hash": "WH2"}]
                }]))
            }),
        );
    let base = spawn_server(router).await;

    let engine = Arc::new(ScriptedEngine::ready());
    let zip_path = dir.path().join("WH2.zip");
    write_zip(&zip_path, &[("packed.glb", "bytes")]);
    engine.script("WH2", BatchOutcome::CompletedZip(zip_path));

    let ctx = scripted_context(Arc::clone(&engine), &storage_dir, dir.path(), &base);
    expand_profile(&ctx, "0xABC").await.unwrap();

    let submissions = engine.asset_submissions.lock().unwrap();
    let asset = &submissions[0].assets[0];
    let expected_base =
        PipelineContext::<ScriptedEngine, mobilepack::storage::LocalStorage>::contents_base(&base);
    assert_eq!(asset.base_url, expected_base);
    assert_eq!(asset.url, format!("{expected_base}WH2"));
    assert_eq!(asset.content_mapping["model.glb"], "WH2");
}
