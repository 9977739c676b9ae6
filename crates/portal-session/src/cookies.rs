//! Cookie jar and the file-backed session cache.
//!
//! The jar is owned by the session and only ever replaced wholesale: loaded
//! from disk on startup, saved after a successful login, cleared on
//! invalidation. The fetcher feeds `Set-Cookie` headers into it and asks it
//! for the `Cookie` header of each outgoing request.
//!
//! Parsing, domain and path matching and expiry all follow RFC 6265 through
//! [`cookie_store`]. A `Domain` attribute that does not domain-match the
//! responding host is rejected, and cookies set without one stay host-only.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use cookie_store::CookieStore;
use url::Url;

use crate::types::{PortalError, PortalResult};

/// The set of cookies that make up one logical portal session.
#[derive(Default)]
pub struct SessionCookies {
    store: CookieStore,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired cookies in the jar.
    pub fn len(&self) -> usize {
        self.store.iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.store.iter_unexpired().next().is_none()
    }

    /// Value of the first unexpired cookie called `name`, regardless of domain.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.store
            .iter_unexpired()
            .find(|c| c.name() == name)
            .map(|c| c.value())
    }

    /// Names of the unexpired cookies, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .store
            .iter_unexpired()
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Absorb one `Set-Cookie` header received in response to `request_url`.
    ///
    /// Returns whether the jar kept the cookie. Malformed headers and cookies
    /// scoped to a domain the responding host cannot set are dropped. An
    /// already expired header removes the matching cookie.
    pub fn absorb_set_cookie(&mut self, header: &str, request_url: &Url) -> bool {
        match self.store.parse(header, request_url) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(
                    "Ignored Set-Cookie from {}: {}",
                    request_url.host_str().unwrap_or("?"),
                    e
                );
                false
            }
        }
    }

    /// Build the `Cookie` request header for `url`, if any cookie applies.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

impl fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookies")
            .field("names", &self.names())
            .finish()
    }
}

/// Outcome of reading the session cache from disk.
///
/// Both failure cases mean "no prior session"; they are kept apart so callers
/// can log and tests can assert on which one happened.
#[derive(Debug)]
pub enum CookieLoad {
    Restored(SessionCookies),
    Missing,
    Corrupt(String),
}

impl CookieLoad {
    pub fn into_cookies(self) -> SessionCookies {
        match self {
            CookieLoad::Restored(cookies) => cookies,
            CookieLoad::Missing | CookieLoad::Corrupt(_) => SessionCookies::new(),
        }
    }
}

/// File-backed storage for the session cookie jar.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the jar. Never fails: a missing or unreadable file is reported
    /// as such and treated as an empty session by the caller.
    ///
    /// Session cookies are restored too; the portal's login cookie has no
    /// expiry of its own.
    pub fn load(&self) -> CookieLoad {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return CookieLoad::Missing,
            Err(e) => return CookieLoad::Corrupt(e.to_string()),
        };
        match cookie_store::serde::json::load_all(BufReader::new(file)) {
            Ok(store) => CookieLoad::Restored(SessionCookies { store }),
            Err(e) => CookieLoad::Corrupt(e.to_string()),
        }
    }

    /// Overwrite the cache file with the full jar, session cookies included.
    pub fn save(&self, cookies: &SessionCookies) -> PortalResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(
            &cookies.store,
            &mut writer,
        )
        .map_err(|e| PortalError::CookieStore(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// Remove the cache file if present.
    pub fn delete(&self) -> PortalResult<()> {
        remove_if_present(&self.path)
    }
}

pub(crate) fn remove_if_present(path: &Path) -> PortalResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
