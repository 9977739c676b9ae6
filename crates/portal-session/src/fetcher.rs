//! Page fetching over blocking HTTP.
//!
//! Not a browser: just GET and form POST with a cookie jar. Redirects are
//! followed by hand so that cookies set on intermediate hops (typical for
//! login flows) land in the jar.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::StatusCode;
use url::Url;

use crate::cookies::SessionCookies;
use crate::types::{PortalError, PortalResult};

/// Portal the CLI talks to unless configured otherwise.
pub const DEFAULT_BASE_URL: &str = "https://itunesconnect.apple.com";

const MAX_REDIRECTS: usize = 5;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// A fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs requests against the portal on behalf of a session.
///
/// Paths are relative to the portal base URL; absolute URLs are accepted as
/// well. Implementations must read cookies from `cookies` for the request and
/// store any cookies the server sets back into it.
pub trait PageFetcher {
    fn get(&self, path: &str, cookies: &mut SessionCookies) -> PortalResult<Page>;

    fn post_form(
        &self,
        path: &str,
        fields: &[(String, String)],
        cookies: &mut SessionCookies,
    ) -> PortalResult<Page>;
}

impl<T: PageFetcher + ?Sized> PageFetcher for &T {
    fn get(&self, path: &str, cookies: &mut SessionCookies) -> PortalResult<Page> {
        (**self).get(path, cookies)
    }

    fn post_form(
        &self,
        path: &str,
        fields: &[(String, String)],
        cookies: &mut SessionCookies,
    ) -> PortalResult<Page> {
        (**self).post_form(path, fields, cookies)
    }
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
}

impl HttpFetcher {
    /// Create a fetcher for the portal at `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout_ms: u64) -> PortalResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()?;
        let base_url = Url::parse(base_url)?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Turn a scraped path into an absolute URL on the portal.
    pub fn resolve(&self, path: &str) -> PortalResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn send(
        &self,
        mut url: Url,
        mut form: Option<&[(String, String)]>,
        cookies: &mut SessionCookies,
    ) -> PortalResult<Page> {
        let mut last_status = 0;

        for _ in 0..=MAX_REDIRECTS {
            let mut builder = match form {
                Some(fields) => self.client.post(url.clone()).form(fields),
                None => self.client.get(url.clone()),
            };
            if let Some(header) = cookies.header_for(&url) {
                builder = builder.header(COOKIE, header);
            }

            let resp = builder.send()?;
            let status = resp.status();
            last_status = status.as_u16();

            for value in resp.headers().get_all(SET_COOKIE) {
                if let Ok(raw) = value.to_str() {
                    cookies.absorb_set_cookie(raw, &url);
                }
            }

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(location) = location {
                    let next = url.join(&location)?;
                    // 307/308 repeat the POST; everything else becomes a GET.
                    if status != StatusCode::TEMPORARY_REDIRECT
                        && status != StatusCode::PERMANENT_REDIRECT
                    {
                        form = None;
                    }
                    tracing::debug!("Redirect {} -> {}", status.as_u16(), next);
                    url = next;
                    continue;
                }
            }

            let body = resp.text()?;
            return Ok(Page {
                url: url.to_string(),
                status: last_status,
                body,
            });
        }

        Err(PortalError::FetchFailed {
            path: url.to_string(),
            status: last_status,
        })
    }
}

impl PageFetcher for HttpFetcher {
    fn get(&self, path: &str, cookies: &mut SessionCookies) -> PortalResult<Page> {
        let url = self.resolve(path)?;
        tracing::debug!("GET {url}");
        self.send(url, None, cookies)
    }

    fn post_form(
        &self,
        path: &str,
        fields: &[(String, String)],
        cookies: &mut SessionCookies,
    ) -> PortalResult<Page> {
        let url = self.resolve(path)?;
        tracing::debug!("POST {url} ({} fields)", fields.len());
        self.send(url, Some(fields), cookies)
    }
}
