//! # Condition Fingerprints
//!
//! A 32-bit content hash over a condition's semantic fields, used for change
//! and duplicate detection.
//!
//! Inherited fields (API key, secret reference, region, target policy ID) are
//! cleared on a copy before hashing, so a condition hashes the same whether or
//! not the parent has stamped them in. The child resource identity lives
//! outside `ConditionSpec` and never takes part.
//!
//! Term lists are hashed positionally. Two distinct conditions that collide are
//! reported as duplicates.

use crate::crd::{ConditionSpec, PolicyCondition};
use sha2::{Digest, Sha256};

pub type Fingerprint = u32;

/// Fingerprint of a condition's semantic content
#[must_use]
pub fn fingerprint(condition: &ConditionSpec) -> Fingerprint {
    let mut stripped = condition.clone();
    stripped.base_mut().strip_inherited();

    // Field order of the serialized form follows the struct declarations
    let canonical = serde_json::to_vec(&stripped)
        .unwrap_or_else(|_| format!("{stripped:?}").into_bytes());
    let digest = Sha256::digest(&canonical);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Index pairs of conditions with equal fingerprints
#[must_use]
pub fn find_duplicates(conditions: &[PolicyCondition]) -> Vec<(usize, usize)> {
    let fingerprints: Vec<Fingerprint> = conditions.iter().map(|c| fingerprint(&c.spec)).collect();
    let mut duplicates = Vec::new();
    for (i, a) in fingerprints.iter().enumerate() {
        for (j, b) in fingerprints.iter().enumerate().skip(i + 1) {
            if a == b {
                duplicates.push((i, j));
            }
        }
    }
    duplicates
}
