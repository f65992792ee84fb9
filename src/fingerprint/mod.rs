// src/fingerprint/mod.rs

//! Fingerprints: the hash-based signature of a target's command, its
//! dependencies' outputs and its options.
//!
//! - [`record`] defines what is persisted per target.
//! - [`store`] provides the [`FingerprintStore`] trait and its file and
//!   in-memory implementations.

pub mod record;
pub mod store;

pub use record::{DependencyHash, FingerprintInputs, FingerprintRecord, RecordStatus};
pub use store::{FileFingerprintStore, FingerprintStore, MemoryFingerprintStore};

use crate::pipeline::{Settings, Target};

/// Assemble the fingerprint inputs of `target` given its dependencies'
/// current output hashes.
///
/// `dep_hashes` may be in any order; the result is sorted by name.
pub fn inputs_for(
    target: &Target,
    settings: &Settings,
    dep_hashes: impl IntoIterator<Item = (String, String)>,
) -> FingerprintInputs {
    let mut deps: Vec<DependencyHash> = dep_hashes
        .into_iter()
        .map(|(name, output_hash)| DependencyHash { name, output_hash })
        .collect();
    deps.sort_by(|a, b| a.name.cmp(&b.name));

    FingerprintInputs {
        command_hash: target.command.hash(),
        deps,
        format: settings.format_of(target),
        seed: target.effective_seed(),
    }
}
