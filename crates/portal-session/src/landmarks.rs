//! Every markup-dependent lookup the client performs, in one table.
//!
//! The portal's HTML is the protocol. When the site's markup drifts, this is
//! the only file that should need to change.

/// How a landmark's visible text must read for an element to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Any,
    Exact(&'static str),
    StartsWith(&'static str),
}

impl TextMatch {
    /// `text` is expected to be whitespace-collapsed already.
    pub fn accepts(&self, text: &str) -> bool {
        match self {
            TextMatch::Any => true,
            TextMatch::Exact(expected) => text == *expected,
            TextMatch::StartsWith(prefix) => text.starts_with(prefix),
        }
    }
}

/// A named CSS query plus an optional text filter.
#[derive(Debug, Clone, Copy)]
pub struct Landmark {
    pub name: &'static str,
    pub selector: &'static str,
    pub text: TextMatch,
}

impl Landmark {
    const fn new(name: &'static str, selector: &'static str) -> Self {
        Self {
            name,
            selector,
            text: TextMatch::Any,
        }
    }

    const fn with_text(name: &'static str, selector: &'static str, text: TextMatch) -> Self {
        Self {
            name,
            selector,
            text,
        }
    }
}

/// Form field the portal expects the account name in.
pub const USERNAME_FIELD: &str = "theAccountName";
/// Form field the portal expects the password in.
pub const PASSWORD_FIELD: &str = "theAccountPW";

// ── Login ──────────────────────────────────────────────────────────────────

pub const LOGIN_FORM: Landmark = Landmark::new("login-form", "form");

pub const USERNAME_INPUT: Landmark =
    Landmark::new("username-input", "input[name=\"theAccountName\"]");

pub const PASSWORD_INPUT: Landmark =
    Landmark::new("password-input", "input[name=\"theAccountPW\"]");

/// Hidden inputs inside the login form, replayed with the credentials.
pub const FORM_HIDDEN_INPUTS: Landmark =
    Landmark::new("form-hidden-inputs", "input[type=\"hidden\"][name]");

// ── Authenticated landing page ─────────────────────────────────────────────

pub const MANAGE_APPS_LINK: Landmark = Landmark::with_text(
    "manage-link",
    "a",
    TextMatch::Exact("Manage Your Applications"),
);

pub const SIGN_OUT_LINK: Landmark = Landmark::with_text(
    "signout-link",
    "li[class*=\"sign-out\"] > a",
    TextMatch::Exact("Sign Out"),
);

// ── Manage applications page ───────────────────────────────────────────────

pub const SEE_ALL_LINK: Landmark = Landmark::with_text(
    "see-all-link",
    "div.seeAll a",
    TextMatch::StartsWith("See All"),
);

// ── Application list ───────────────────────────────────────────────────────

pub const RESULT_ROWS: Landmark = Landmark::new(
    "result-table-rows",
    "div#software-result-list > div.resultList > table > tbody > tr:not([class*=\"column-headers\"])",
);

/// Tag of the cells inside a result row (direct children only).
pub const ROW_CELL_TAG: &str = "td";
/// Cell holding the name anchor.
pub const ROW_NAME_CELL: usize = 0;
/// Cell holding the numeric application id.
pub const ROW_ID_CELL: usize = 4;

pub const ROW_NAME_LINK: Landmark = Landmark::new("row-name-link", "a");

pub const ROW_ID_TEXT: Landmark = Landmark::new("row-id-text", "p");
