//! Portal session — cookie-persisted login and link discovery for web portals
//! that expose no API, plus a scraped application directory.

pub mod cookies;
pub mod credentials;
pub mod directory;
pub mod fetcher;
pub mod landmarks;
pub mod navigator;
pub mod session;
pub mod types;

pub use cookies::{CookieLoad, SessionCache, SessionCookies};
pub use credentials::Credentials;
pub use directory::{ApplicationDirectory, DirectoryLoad, DirectoryStore, RefreshOutcome};
pub use fetcher::{HttpFetcher, Page, PageFetcher, DEFAULT_BASE_URL};
pub use navigator::{Document, Node};
pub use session::{Endpoints, PortalSession, SessionOptions, SessionState, DEFAULT_LANDING_PATH};
pub use types::*;
