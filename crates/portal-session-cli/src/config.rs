//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit flag, environment
//! variable, built-in default.

use std::path::PathBuf;

use anyhow::{bail, Result};
use portal_session::{Credentials, DEFAULT_BASE_URL};

pub const ENV_BASE_URL: &str = "PORTAL_BASE_URL";
pub const ENV_SESSION_FILE: &str = "PORTAL_SESSION_FILE";
pub const ENV_DIRECTORY_FILE: &str = "PORTAL_DIRECTORY_FILE";
pub const ENV_USERNAME: &str = "PORTAL_USERNAME";
pub const ENV_PASSWORD: &str = "PORTAL_PASSWORD";

const DATA_DIR: &str = ".portal-session";
const SESSION_FILE: &str = "session.json";
const DIRECTORY_FILE: &str = "applications.json";

/// Resolve the portal base URL.
pub fn resolve_base_url(explicit: Option<&str>) -> String {
    pick(explicit, env(ENV_BASE_URL)).unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Resolve the session cookie cache path.
pub fn resolve_session_path(explicit: Option<&str>) -> PathBuf {
    pick(explicit, env(ENV_SESSION_FILE))
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir().join(SESSION_FILE))
}

/// Resolve the application directory cache path.
pub fn resolve_directory_path(explicit: Option<&str>) -> PathBuf {
    pick(explicit, env(ENV_DIRECTORY_FILE))
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir().join(DIRECTORY_FILE))
}

/// Resolve login credentials.
///
/// The password is only ever read from the environment so it does not show
/// up in shell history or the process list. When `required` is false,
/// missing values resolve to empty strings; commands that never post the
/// login form can run without them.
pub fn resolve_credentials(explicit_username: Option<&str>, required: bool) -> Result<Credentials> {
    credentials_from(
        pick(explicit_username, env(ENV_USERNAME)),
        env(ENV_PASSWORD),
        required,
    )
}

fn credentials_from(
    username: Option<String>,
    password: Option<String>,
    required: bool,
) -> Result<Credentials> {
    match (username, password) {
        (Some(username), Some(password)) => Ok(Credentials::new(username, password)),
        (username, password) if !required => Ok(Credentials::new(
            username.unwrap_or_default(),
            password.unwrap_or_default(),
        )),
        (None, _) => bail!("No username given. Pass --username or set {ENV_USERNAME}."),
        (Some(_), None) => bail!("No password given. Set {ENV_PASSWORD}."),
    }
}

fn pick(explicit: Option<&str>, from_env: Option<String>) -> Option<String> {
    explicit.map(str::to_string).or(from_env)
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR)
}
