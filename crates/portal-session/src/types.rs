//! Shared record and error types.

use serde::{Deserialize, Serialize};

/// One application row scraped from the portal's application list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: u64,
    pub name: String,
    /// Relative link to the application's detail page.
    #[serde(rename = "link")]
    pub detail_path: String,
}

/// Errors that can occur while driving a portal session.
#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    /// The portal still showed its login form after credentials were posted.
    #[error("Authentication failed: check username/password")]
    AuthenticationFailed,

    #[error("Not authenticated")]
    NotAuthenticated,

    /// An expected HTML landmark was absent or duplicated.
    #[error("Page structure changed at landmark '{landmark}': {detail}")]
    PageStructureChanged {
        landmark: &'static str,
        detail: String,
    },

    #[error("Fetch failed: {path} returned HTTP {status}")]
    FetchFailed { path: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Cookie store error: {0}")]
    CookieStore(String),
}

impl PortalError {
    pub(crate) fn structure(landmark: &'static str, detail: impl Into<String>) -> Self {
        PortalError::PageStructureChanged {
            landmark,
            detail: detail.into(),
        }
    }

    /// Whether the error means the remote markup no longer matches expectations.
    pub fn is_structural(&self) -> bool {
        matches!(self, PortalError::PageStructureChanged { .. })
    }
}

/// Convenience result type.
pub type PortalResult<T> = Result<T, PortalError>;
