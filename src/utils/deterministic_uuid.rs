//! Deterministic UUID generation
//!
//! The same inputs always produce the same UUID, so persisted rows keep
//! their identity across restarts and re-syncs.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a deterministic UUID from ordered inputs
pub fn generate_deterministic_uuid(inputs: &[&dyn std::fmt::Display]) -> Uuid {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input.to_string().as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Stable id for a guide source configured only by name
pub fn generate_guide_source_uuid(name: &str) -> Uuid {
    generate_deterministic_uuid(&[&"guide-source", &name.trim().to_lowercase()])
}

/// Stable row id for a guide channel within a guide source
pub fn generate_guide_channel_uuid(guide_source_id: &Uuid, channel_id: &str) -> Uuid {
    generate_deterministic_uuid(&[&guide_source_id, &channel_id])
}
