//! Session lifecycle and link discovery.
//!
//! Authentication state is derived from freshly fetched HTML, never trusted
//! from the cookie cache alone: a page that still carries the login inputs
//! means "not logged in", anything else means "logged in" and must expose the
//! navigation links the rest of the client depends on.
//!
//! All writes to session state go through [`PortalSession::apply`].

use crate::cookies::{CookieLoad, SessionCache, SessionCookies};
use crate::credentials::Credentials;
use crate::directory::DirectoryStore;
use crate::fetcher::{Page, PageFetcher};
use crate::landmarks::{self, PASSWORD_FIELD, USERNAME_FIELD};
use crate::navigator::Document;
use crate::types::{PortalError, PortalResult};

/// Path of the portal page that shows either the login form or the
/// authenticated landing page.
pub const DEFAULT_LANDING_PATH: &str = "/WebObjects/iTunesConnect.woa";

/// Endpoint paths scraped from authenticated pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub manage_apps_path: String,
    pub logout_path: String,
    /// Resolved lazily by the application directory.
    pub application_list_path: Option<String>,
}

/// Where the session stands with the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No page has been inspected yet.
    Unknown,
    Unauthenticated,
    Authenticated(Endpoints),
}

/// File locations and paths a session is built with.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub landing_path: String,
    pub session_cache: SessionCache,
    pub directory_store: DirectoryStore,
}

impl SessionOptions {
    pub fn new(session_cache: SessionCache, directory_store: DirectoryStore) -> Self {
        Self {
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            session_cache,
            directory_store,
        }
    }

    pub fn with_landing_path(mut self, path: impl Into<String>) -> Self {
        self.landing_path = path.into();
        self
    }
}

enum Transition {
    Discovered {
        manage_apps_path: String,
        logout_path: String,
    },
    ListingResolved(String),
    Invalidated,
}

/// A logged-in (or not) conversation with the portal.
pub struct PortalSession<F> {
    fetcher: F,
    credentials: Credentials,
    cookies: SessionCookies,
    cookie_cache: SessionCache,
    directory_store: DirectoryStore,
    landing_path: String,
    state: SessionState,
}

impl<F: PageFetcher> PortalSession<F> {
    /// Build a session in the `Unknown` state, restoring cookies from the
    /// session cache when it holds a readable jar.
    pub fn new(fetcher: F, credentials: Credentials, options: SessionOptions) -> Self {
        let cookies = match options.session_cache.load() {
            CookieLoad::Restored(cookies) => {
                tracing::debug!(
                    "Restored {} cookies from {}",
                    cookies.len(),
                    options.session_cache.path().display()
                );
                cookies
            }
            CookieLoad::Missing => {
                tracing::debug!(
                    "No session cache at {}",
                    options.session_cache.path().display()
                );
                SessionCookies::new()
            }
            CookieLoad::Corrupt(reason) => {
                tracing::warn!(
                    "Ignoring unreadable session cache {}: {reason}",
                    options.session_cache.path().display()
                );
                SessionCookies::new()
            }
        };

        Self {
            fetcher,
            credentials,
            cookies,
            cookie_cache: options.session_cache,
            directory_store: options.directory_store,
            landing_path: options.landing_path,
            state: SessionState::Unknown,
        }
    }

    /// Build a session and immediately ask the portal whether the restored
    /// cookies are still good.
    pub fn open(fetcher: F, credentials: Credentials, options: SessionOptions) -> PortalResult<Self> {
        let mut session = Self::new(fetcher, credentials, options);
        session.check_status(None)?;
        Ok(session)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    pub fn endpoints(&self) -> Option<&Endpoints> {
        match &self.state {
            SessionState::Authenticated(endpoints) => Some(endpoints),
            _ => None,
        }
    }

    pub fn cookies(&self) -> &SessionCookies {
        &self.cookies
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    pub fn directory_store(&self) -> &DirectoryStore {
        &self.directory_store
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Decide whether the session is logged in.
    ///
    /// With `body` the given page is inspected; otherwise the landing page is
    /// fetched with the current cookies. Being logged out is a normal answer
    /// (`Ok(false)`) and wipes local session state. Being logged in refreshes
    /// the discovered endpoints and fails if they cannot be found.
    pub fn check_status(&mut self, body: Option<&str>) -> PortalResult<bool> {
        let fetched;
        let body = match body {
            Some(body) => body,
            None => {
                tracing::debug!("Check login: requesting {}", self.landing_path);
                let page = self.fetcher.get(&self.landing_path, &mut self.cookies)?;
                if !page.is_success() {
                    tracing::debug!("Check login: HTTP {}, not logged in", page.status);
                    self.apply(Transition::Invalidated)?;
                    return Ok(false);
                }
                fetched = page.body;
                fetched.as_str()
            }
        };

        let document = Document::parse(body);
        if document.contains(&landmarks::USERNAME_INPUT)?
            && document.contains(&landmarks::PASSWORD_INPUT)?
        {
            tracing::debug!("Check login: login form present, not logged in");
            self.apply(Transition::Invalidated)?;
            return Ok(false);
        }

        tracing::debug!("Check login: logged in");
        let (manage_apps_path, logout_path) = discover_endpoints(&document)?;
        self.apply(Transition::Discovered {
            manage_apps_path,
            logout_path,
        })?;
        Ok(true)
    }

    /// Log in with the session's credentials unless already logged in.
    ///
    /// On success the cookie jar is written to the session cache before
    /// returning.
    pub fn login(&mut self) -> PortalResult<()> {
        if self.state == SessionState::Unknown {
            self.check_status(None)?;
        }
        if self.is_authenticated() {
            tracing::debug!("Login: already logged in");
            return Ok(());
        }

        let landing = self.fetcher.get(&self.landing_path, &mut self.cookies)?;
        if !landing.is_success() {
            return Err(PortalError::FetchFailed {
                path: self.landing_path.clone(),
                status: landing.status,
            });
        }

        let form = LoginForm::extract(&Document::parse(&landing.body))?;
        let fields = form.fields(&self.credentials);
        tracing::debug!("Login: posting credentials to {}", form.action);
        let response = self
            .fetcher
            .post_form(&form.action, &fields, &mut self.cookies)?;

        if !self.check_status(Some(&response.body))? {
            return Err(PortalError::AuthenticationFailed);
        }

        self.cookie_cache.save(&self.cookies)?;
        tracing::info!(
            "Login: logged in as {}. Session cookies saved to {}",
            self.credentials.username(),
            self.cookie_cache.path().display()
        );
        Ok(())
    }

    /// Sign out on the server (best effort) and drop all local session state.
    pub fn logout(&mut self) -> PortalResult<()> {
        let logout_path = match &self.state {
            SessionState::Authenticated(endpoints) if !endpoints.logout_path.is_empty() => {
                endpoints.logout_path.clone()
            }
            _ => {
                tracing::debug!("Logout: not logged in");
                return Ok(());
            }
        };

        match self.fetcher.get(&logout_path, &mut self.cookies) {
            Ok(page) => tracing::debug!("Logout: HTTP {}", page.status),
            Err(e) => tracing::warn!("Logout request failed: {e}"),
        }
        self.apply(Transition::Invalidated)?;
        tracing::info!("Logout: session cleared");
        Ok(())
    }

    /// Forget the session: cookies, the session cache and the directory cache.
    pub fn invalidate(&mut self) -> PortalResult<()> {
        self.apply(Transition::Invalidated)
    }

    /// GET `path` with the session cookies. Requires a logged-in session.
    pub fn fetch_authenticated(&mut self, path: &str) -> PortalResult<Page> {
        if !self.is_authenticated() {
            return Err(PortalError::NotAuthenticated);
        }
        self.fetcher.get(path, &mut self.cookies)
    }

    /// Remember where the application list lives for the rest of the process.
    pub(crate) fn record_listing_path(&mut self, path: String) -> PortalResult<()> {
        self.apply(Transition::ListingResolved(path))
    }

    fn apply(&mut self, transition: Transition) -> PortalResult<()> {
        match transition {
            Transition::Discovered {
                manage_apps_path,
                logout_path,
            } => {
                let application_list_path = match &self.state {
                    SessionState::Authenticated(prev) if prev.manage_apps_path == manage_apps_path => {
                        prev.application_list_path.clone()
                    }
                    _ => None,
                };
                tracing::debug!("Manage apps path: {manage_apps_path}");
                tracing::debug!("Logout path: {logout_path}");
                self.state = SessionState::Authenticated(Endpoints {
                    manage_apps_path,
                    logout_path,
                    application_list_path,
                });
            }
            Transition::ListingResolved(path) => match &mut self.state {
                SessionState::Authenticated(endpoints) => {
                    tracing::debug!("Application list path: {path}");
                    endpoints.application_list_path = Some(path);
                }
                _ => return Err(PortalError::NotAuthenticated),
            },
            Transition::Invalidated => {
                self.cookies.clear();
                self.state = SessionState::Unauthenticated;
                self.cookie_cache.delete()?;
                self.directory_store.delete()?;
            }
        }
        Ok(())
    }
}

/// Find the manage-applications and sign-out links on an authenticated page.
fn discover_endpoints(document: &Document) -> PortalResult<(String, String)> {
    let manage = document.single(&landmarks::MANAGE_APPS_LINK)?;
    let manage_apps_path = manage.require_attr(&landmarks::MANAGE_APPS_LINK, "href")?;

    let sign_out = document.single(&landmarks::SIGN_OUT_LINK)?;
    let logout_path = sign_out.require_attr(&landmarks::SIGN_OUT_LINK, "href")?;

    Ok((manage_apps_path.to_string(), logout_path.to_string()))
}

/// The login form found on the landing page.
struct LoginForm {
    action: String,
    hidden: Vec<(String, String)>,
}

impl LoginForm {
    fn extract(document: &Document) -> PortalResult<Self> {
        let form = document.first(&landmarks::LOGIN_FORM)?.ok_or_else(|| {
            PortalError::structure(landmarks::LOGIN_FORM.name, "no form on the landing page")
        })?;
        let action = form
            .require_attr(&landmarks::LOGIN_FORM, "action")?
            .to_string();

        let hidden = form
            .query(&landmarks::FORM_HIDDEN_INPUTS)?
            .into_iter()
            .filter_map(|input| {
                let name = input.attr("name")?;
                if name == USERNAME_FIELD || name == PASSWORD_FIELD {
                    return None;
                }
                Some((name.to_string(), input.attr("value").unwrap_or("").to_string()))
            })
            .collect();

        Ok(Self { action, hidden })
    }

    fn fields(&self, credentials: &Credentials) -> Vec<(String, String)> {
        let mut fields = self.hidden.clone();
        fields.push((USERNAME_FIELD.to_string(), credentials.username().to_string()));
        fields.push((PASSWORD_FIELD.to_string(), credentials.password().to_string()));
        fields
    }
}
