//! Pre-flight entity validation.
//!
//! Oversized scenes are rejected before any engine work: the engine would
//! spend the whole batch timeout on them and still fail. The validation
//! result lands in the report.

use crate::entity::EntityDefinition;
use thiserror::Error;

/// Maximum GLTF files one scene may carry.
pub const MAX_GLTF_COUNT: usize = 200;

/// Maximum total content size one scene may carry.
pub const MAX_CONTENT_SIZE_BYTES: u64 = 1024 * 1024 * 1024;

/// Validation failures; fatal for the job, no engine work performed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("scene has {count} GLTF files, limit is {limit}")]
    TooManyGltfs { count: usize, limit: usize },

    #[error("scene content is {bytes} bytes, limit is {limit}")]
    ContentTooLarge { bytes: u64, limit: u64 },
}

/// Check an entity against the GLTF-count and content-size limits.
///
/// The size check only applies when the content server reports sizes;
/// definitions without size information pass it vacuously.
pub fn validate_entity(entity: &EntityDefinition) -> Result<(), ValidationError> {
    let gltf_count = entity.gltf_entries().len();
    if gltf_count > MAX_GLTF_COUNT {
        return Err(ValidationError::TooManyGltfs {
            count: gltf_count,
            limit: MAX_GLTF_COUNT,
        });
    }

    let total_bytes: u64 = entity
        .content
        .iter()
        .filter_map(|entry| entry.size)
        .sum();
    if total_bytes > MAX_CONTENT_SIZE_BYTES {
        return Err(ValidationError::ContentTooLarge {
            bytes: total_bytes,
            limit: MAX_CONTENT_SIZE_BYTES,
        });
    }

    Ok(())
}
