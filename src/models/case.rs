//! Case models.
//!
//! Cases are owned entirely by the case-management backend; this client only
//! reads the listing used to attach evidence to an existing case.

use serde::{Deserialize, Serialize};

/// A case as returned by the backend case listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    /// Backend identifier for the case.
    #[serde(rename = "_id")]
    pub id: String,
    /// Human-readable case title.
    pub title: String,
}
