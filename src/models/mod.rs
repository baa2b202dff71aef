//! Data models for Custodia.

mod case;
mod evidence;

pub use case::CaseSummary;
pub use evidence::{compute_content_hash, EvidenceMetadata, EvidenceRecord, EvidenceType};
