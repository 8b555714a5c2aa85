//! # ksi_evidence
//!
//! Tamper-evident evidence packs for KSI evaluations.
//!
//! A pack is assembled in two phases. [`EvidencePackBuilder::begin`] writes
//! the scope documents into a fresh staging directory and hands back a
//! [`ProvisionalPack`]; declared artifacts are added to it, criteria that
//! depend on the file list are evaluated, and
//! [`ProvisionalPack::finalize`] writes the evaluation manifest, the
//! artifact index and the `sha256sum` listing before zipping the staging
//! directory deterministically.
//!
//! ## Layout
//!
//! ```text
//! evidence_<set>_<shortsha>_<timestamp>.zip
//! └── <set>/
//!     ├── collected_at.json
//!     ├── scope.json
//!     ├── tools.json
//!     ├── declared/
//!     ├── evaluation_manifest.json
//!     ├── manifest.json
//!     └── hashes.sha256
//! ```
//!
//! [`verify_pack`] and [`verify_archive`] recompute every digest.

pub mod archive;
pub mod documents;
pub mod error;
pub mod hashes;
pub mod pack;
pub mod results;

pub use archive::write_archive;
pub use documents::{required_files, ArtifactIndex, CollectedAt, FileEntry, ScopeDocument, ToolsDocument};
pub use error::{EvidenceError, EvidenceResult};
pub use hashes::{sha256_hex, verify_archive, verify_pack, HashListing, VerificationReport};
pub use pack::{archive_stem, EvidencePack, EvidencePackBuilder, ProvisionalPack};
pub use results::{CriterionSetResult, ResultsSummary};
