//! Cookie snapshot model — the pair of portal cookies one account shares.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Session-id cookie issued by the portal.
pub const SESSION_COOKIE: &str = "ASP.NET_SessionId";
/// Application session token cookie.
pub const OFFICE_COOKIE: &str = "ResoOffice60";
/// Base URL of the target portal.
pub const PORTAL_URL: &str = "https://office.reso.ru/";

/// SameSite attribute of a cookie record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// One cookie as it travels over the store wire and into the browser.
///
/// `domain` is present only on store-side records; it is stripped before
/// browser insertion. Browser-only attributes (expiry) are not modelled, so
/// structural equality ignores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default = "default_same_site")]
    pub same_site: SameSite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

fn default_path() -> String {
    "/".into()
}

fn default_same_site() -> SameSite {
    SameSite::Lax
}

impl CookieRecord {
    /// Strip the domain and force `SameSite=None`. Cross-origin restoration
    /// of the portal cookies only works in this shape.
    pub fn normalized(mut self) -> Self {
        self.domain = None;
        self.same_site = SameSite::None;
        self
    }
}

/// The two tracked cookies of one authenticated portal session.
///
/// Completeness is encoded by construction: a value of this type always
/// holds both records, so an incomplete snapshot can never be written back
/// to the browser or the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSnapshot {
    #[serde(rename = "ASP.NET_SessionId")]
    pub session: CookieRecord,
    #[serde(rename = "ResoOffice60")]
    pub office: CookieRecord,
}

impl CookieSnapshot {
    /// Assemble a snapshot from individually looked-up cookies, failing if
    /// either is absent.
    pub fn from_records(
        session: Option<CookieRecord>,
        office: Option<CookieRecord>,
    ) -> Result<Self> {
        match (session, office) {
            (Some(session), Some(office)) => Ok(Self { session, office }),
            _ => Err(Error::IncompleteCookies),
        }
    }

    /// Both records, normalized for insertion into the browser jar.
    pub fn for_insertion(&self) -> [CookieRecord; 2] {
        [
            self.session.clone().normalized(),
            self.office.clone().normalized(),
        ]
    }

    /// Normalize both records in place (the canonical store-side shape).
    pub fn normalized(self) -> Self {
        Self {
            session: self.session.normalized(),
            office: self.office.normalized(),
        }
    }

    /// Placeholder snapshot used to provision fresh accounts and to
    /// bootstrap an empty store.
    pub fn sample() -> Self {
        Self {
            session: CookieRecord {
                name: SESSION_COOKIE.into(),
                value: "0".repeat(224),
                path: "/".into(),
                secure: false,
                http_only: true,
                same_site: SameSite::None,
                domain: Some("office.reso.ru".into()),
            },
            office: CookieRecord {
                name: OFFICE_COOKIE.into(),
                value: "0".repeat(24),
                path: "/".into(),
                secure: false,
                http_only: true,
                same_site: SameSite::None,
                domain: Some("office.reso.ru".into()),
            },
        }
    }
}
