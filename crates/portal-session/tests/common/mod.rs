//! A scripted in-memory portal for driving `PortalSession` without a network.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::PathBuf;

use portal_session::{
    Credentials, DirectoryStore, Page, PageFetcher, PortalError, PortalResult, PortalSession,
    SessionCache, SessionCookies, SessionOptions,
};
use url::Url;

pub const BASE: &str = "https://portal.test";
pub const LANDING: &str = "/WebObjects/iTunesConnect.woa";
pub const LOGIN_ACTION: &str = "/WebObjects/iTunesConnect.woa/wo/0.0.1.3";
pub const MANAGE: &str = "/WebObjects/iTunesConnect.woa/wo/4.0.0.7";
pub const SIGN_OUT: &str = "/WebObjects/iTunesConnect.woa/wo/4.0.0.9";
pub const LIST: &str = "/WebObjects/iTunesConnect.woa/wo/8.0.0.1";

pub const USERNAME: &str = "dev@example.com";
pub const PASSWORD: &str = "correct horse";

pub const LOGIN_PAGE: &str = r#"<html><body>
  <form name="appleConnectForm" method="post" action="/WebObjects/iTunesConnect.woa/wo/0.0.1.3">
    <input type="hidden" name="wosid" value="xyz">
    <input type="text" id="accountname" name="theAccountName">
    <input type="password" id="accountpassword" name="theAccountPW">
    <input type="submit" value="Sign In">
  </form>
</body></html>"#;

pub const HOME_PAGE: &str = r#"<html><body>
  <ul id="header-nav">
    <li class="home"><a href="/WebObjects/iTunesConnect.woa/wo/4.0.0.1">Home</a></li>
    <li class="menu sign-out"><a href="/WebObjects/iTunesConnect.woa/wo/4.0.0.9">Sign Out</a></li>
  </ul>
  <div class="modules">
    <a href="/WebObjects/iTunesConnect.woa/wo/4.0.0.7">Manage Your Applications</a>
    <a href="/WebObjects/iTunesConnect.woa/wo/4.0.0.8">Sales and Trends</a>
  </div>
</body></html>"#;

pub const MANAGE_PAGE: &str = r#"<html><body>
  <div class="recent-apps">recently viewed</div>
  <div class="seeAll"><a href="/WebObjects/iTunesConnect.woa/wo/8.0.0.1">See All (3)</a></div>
</body></html>"#;

const SESSION_COOKIE: &str = "myacinfo";

/// One request seen by the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
}

pub struct FakePortal {
    pub requests: RefCell<Vec<Request>>,
    /// Session tokens the server currently accepts.
    valid_tokens: RefCell<Vec<String>>,
    next_token: Cell<u32>,
    pub landing_status: Cell<u16>,
    pub landing_override: RefCell<Option<String>>,
    pub home_page: RefCell<String>,
    pub manage_page: RefCell<String>,
    pub listing: RefCell<String>,
    pub listing_status: Cell<u16>,
    pub fail_sign_out: Cell<bool>,
}

impl Default for FakePortal {
    fn default() -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            valid_tokens: RefCell::new(Vec::new()),
            next_token: Cell::new(1),
            landing_status: Cell::new(200),
            landing_override: RefCell::new(None),
            home_page: RefCell::new(HOME_PAGE.to_string()),
            manage_page: RefCell::new(MANAGE_PAGE.to_string()),
            listing: RefCell::new(listing_page(&[])),
            listing_status: Cell::new(200),
            fail_sign_out: Cell::new(false),
        }
    }
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn posts(&self) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.method == "POST")
            .count()
    }

    pub fn total(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Forget every issued session, as if it expired server-side.
    pub fn expire_sessions(&self) {
        self.valid_tokens.borrow_mut().clear();
    }

    pub fn set_listing(&self, rows: &[(&str, &str, &str)]) {
        *self.listing.borrow_mut() = listing_page(rows);
    }

    fn url(path: &str) -> Url {
        Url::parse(BASE).unwrap().join(path).unwrap()
    }

    fn has_session(&self, path: &str, cookies: &SessionCookies) -> bool {
        let Some(header) = cookies.header_for(&Self::url(path)) else {
            return false;
        };
        let tokens = self.valid_tokens.borrow();
        header.split("; ").any(|pair| {
            pair.split_once('=')
                .is_some_and(|(name, value)| name == SESSION_COOKIE && tokens.iter().any(|t| t == value))
        })
    }

    fn page(path: &str, status: u16, body: impl Into<String>) -> Page {
        Page {
            url: Self::url(path).to_string(),
            status,
            body: body.into(),
        }
    }
}

impl PageFetcher for FakePortal {
    fn get(&self, path: &str, cookies: &mut SessionCookies) -> PortalResult<Page> {
        self.requests.borrow_mut().push(Request {
            method: "GET",
            path: path.to_string(),
        });
        let authed = self.has_session(path, cookies);

        match path {
            LANDING => {
                let status = self.landing_status.get();
                if let Some(body) = self.landing_override.borrow().clone() {
                    return Ok(Self::page(path, status, body));
                }
                let body = if authed {
                    self.home_page.borrow().clone()
                } else {
                    LOGIN_PAGE.to_string()
                };
                Ok(Self::page(path, status, body))
            }
            MANAGE if authed => Ok(Self::page(path, 200, self.manage_page.borrow().clone())),
            LIST if authed => Ok(Self::page(
                path,
                self.listing_status.get(),
                self.listing.borrow().clone(),
            )),
            SIGN_OUT => {
                if self.fail_sign_out.get() {
                    return Err(PortalError::FetchFailed {
                        path: path.to_string(),
                        status: 502,
                    });
                }
                self.expire_sessions();
                Ok(Self::page(path, 200, LOGIN_PAGE))
            }
            _ if !authed => Ok(Self::page(path, 302, "")),
            _ => Ok(Self::page(path, 404, "not found")),
        }
    }

    fn post_form(
        &self,
        path: &str,
        fields: &[(String, String)],
        cookies: &mut SessionCookies,
    ) -> PortalResult<Page> {
        self.requests.borrow_mut().push(Request {
            method: "POST",
            path: path.to_string(),
        });
        let field = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        let accepted = path == LOGIN_ACTION
            && field("theAccountName") == Some(USERNAME)
            && field("theAccountPW") == Some(PASSWORD)
            && field("wosid") == Some("xyz");
        if !accepted {
            return Ok(Self::page(path, 200, LOGIN_PAGE));
        }

        let token = format!("token-{}", self.next_token.get());
        self.next_token.set(self.next_token.get() + 1);
        self.valid_tokens.borrow_mut().push(token.clone());
        cookies.absorb_set_cookie(
            &format!("{SESSION_COOKIE}={token}; Path=/; Secure; HttpOnly"),
            &Self::url(path),
        );
        Ok(Self::page(path, 200, self.home_page.borrow().clone()))
    }
}

/// Listing page with a header row followed by `(name, link, id)` rows.
pub fn listing_page(rows: &[(&str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(name, link, id)| {
            format!(
                r#"<tr><td><div class="app-name"><a href="{link}">{name}</a></div></td>
                   <td>iOS App</td><td>1.2</td><td>Ready for Sale</td>
                   <td><p>{id}</p></td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><div id="software-result-list"><div class="resultList"><table>
           <tbody>
           <tr class="column-headers"><td>App Name</td><td>Type</td><td>Version</td><td>Status</td><td>Apple ID</td></tr>
           {body}
           </tbody>
           </table></div></div></body></html>"#
    )
}

/// Temp directory holding one session's cache files.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.dir.path().join("session.json")
    }

    pub fn directory_path(&self) -> PathBuf {
        self.dir.path().join("applications.json")
    }

    pub fn options(&self) -> SessionOptions {
        SessionOptions::new(
            SessionCache::new(self.cookie_path()),
            DirectoryStore::new(self.directory_path()),
        )
        .with_landing_path(LANDING)
    }

    pub fn store(&self) -> DirectoryStore {
        DirectoryStore::new(self.directory_path())
    }

    pub fn session<'a>(&self, portal: &'a FakePortal) -> PortalSession<&'a FakePortal> {
        PortalSession::new(portal, credentials(), self.options())
    }

    pub fn session_with<'a>(
        &self,
        portal: &'a FakePortal,
        credentials: Credentials,
    ) -> PortalSession<&'a FakePortal> {
        PortalSession::new(portal, credentials, self.options())
    }

    /// A session that has gone through a successful login.
    pub fn logged_in<'a>(&self, portal: &'a FakePortal) -> PortalSession<&'a FakePortal> {
        let mut session = self.session(portal);
        session.login().unwrap();
        session
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(USERNAME, PASSWORD)
}
