//! Portal session over a live WebDriver browser.
//!
//! The DOM-coupled auth probe lives entirely behind `auth_complete()`; the
//! reconciliation logic never inspects page structure. Driver errors are
//! classified into `BrowserFault` in one place so nothing upstream handles
//! WebDriver error types.

use async_trait::async_trait;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use thirtyfour::Cookie;
use tracing::{debug, info};

use resoshare_core::{
    BrowserFault, BrowserKind, CookieRecord, CookieSnapshot, Error, Result, OFFICE_COOKIE,
    SESSION_COOKIE,
};

use crate::detect::capabilities_for;

/// Path prefix of the portal's login page.
const LOGIN_PATH: &str = "/login";
/// Element present once the portal shows the signed-in landing page.
const SIGNED_IN_MARKER: &str = "/html/body/form/div[4]/div[1]/div[7]/div/div/div/div/div[1]";
/// QR image shown while the portal is waiting for a login.
const LOGIN_QR_MARKER: &str = r#"//*[@id="qrImage"]"#;

/// Cookie and navigation access against one live browser.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn get_cookie(&self, name: &str) -> Result<Option<CookieRecord>>;
    async fn set_cookie(&self, record: &CookieRecord) -> Result<()>;
    async fn delete_cookie(&self, name: &str) -> Result<()>;
    /// Whether the browser currently holds a valid authenticated session.
    async fn auth_complete(&self) -> Result<bool>;
    /// After the active window died, try to adopt another open one.
    /// Returns false when no window is left.
    async fn recover_window(&self) -> Result<bool>;
    async fn quit(&mut self) -> Result<()>;
}

/// Read both tracked cookies and assemble the canonical (normalized)
/// snapshot, failing if either cookie is absent.
pub async fn read_snapshot<B: BrowserSession + ?Sized>(session: &B) -> Result<CookieSnapshot> {
    let session_cookie = session.get_cookie(SESSION_COOKIE).await?;
    let office_cookie = session.get_cookie(OFFICE_COOKIE).await?;
    Ok(CookieSnapshot::from_records(session_cookie, office_cookie)?.normalized())
}

/// `BrowserSession` backed by a thirtyfour WebDriver session.
pub struct PortalSession {
    driver: Option<WebDriver>,
}

impl PortalSession {
    /// Start a browser session of the configured family against a running
    /// WebDriver server.
    pub async fn connect(server_url: &str, kind: BrowserKind, user_agent: &str) -> Result<Self> {
        let caps = capabilities_for(kind, user_agent)?;
        let driver = WebDriver::new(server_url, caps).await.map_err(fault)?;
        info!("Started {kind} session via {server_url}");
        Ok(Self {
            driver: Some(driver),
        })
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| BrowserFault::SessionGone.into())
    }

    /// Whether an element matching the XPath exists. Absence is the normal
    /// signal here, not an error.
    async fn marker_present(&self, xpath: &'static str) -> Result<bool> {
        match self.driver()?.find(By::XPath(xpath)).await {
            Ok(_) => Ok(true),
            Err(WebDriverError::NoSuchElement(..)) => Ok(false),
            Err(err) => Err(fault(err)),
        }
    }
}

#[async_trait]
impl BrowserSession for PortalSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.driver()?.goto(url).await.map_err(fault)
    }

    async fn get_cookie(&self, name: &str) -> Result<Option<CookieRecord>> {
        match self.driver()?.get_named_cookie(name).await {
            Ok(cookie) => Ok(Some(from_driver(&cookie)?)),
            Err(WebDriverError::NoSuchCookie(..)) => Ok(None),
            Err(err) => Err(fault(err)),
        }
    }

    async fn set_cookie(&self, record: &CookieRecord) -> Result<()> {
        self.driver()?
            .add_cookie(to_driver(record)?)
            .await
            .map_err(fault)
    }

    async fn delete_cookie(&self, name: &str) -> Result<()> {
        match self.driver()?.delete_cookie(name).await {
            Ok(()) | Err(WebDriverError::NoSuchCookie(..)) => Ok(()),
            Err(err) => Err(fault(err)),
        }
    }

    async fn auth_complete(&self) -> Result<bool> {
        let url = self.driver()?.current_url().await.map_err(fault)?;
        let on_portal = url
            .host_str()
            .is_some_and(|host| host.ends_with("reso.ru"));
        if !on_portal || url.path().starts_with(LOGIN_PATH) {
            return Ok(false);
        }
        Ok(self.marker_present(SIGNED_IN_MARKER).await?
            && !self.marker_present(LOGIN_QR_MARKER).await?)
    }

    async fn recover_window(&self) -> Result<bool> {
        let handles = self.driver()?.windows().await.map_err(fault)?;
        let Some(handle) = handles.into_iter().next() else {
            return Ok(false);
        };
        debug!("Active window gone, switching to a surviving one");
        self.driver()?
            .switch_to_window(handle)
            .await
            .map_err(fault)?;
        Ok(true)
    }

    async fn quit(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.map_err(fault)?;
        }
        Ok(())
    }
}

fn fault(err: WebDriverError) -> Error {
    let fault = match err {
        WebDriverError::NoSuchWindow(..) => BrowserFault::WindowClosed,
        WebDriverError::InvalidSessionId(..) => BrowserFault::SessionGone,
        WebDriverError::UnexpectedAlertOpen(..) => BrowserFault::AlertOpen,
        WebDriverError::InvalidCookieDomain(..) => BrowserFault::CookieDomainMismatch,
        other => BrowserFault::Other(other.to_string()),
    };
    fault.into()
}

// The store record and the W3C cookie object share one wire shape, so the
// conversions are a serde round-trip rather than field-by-field copies.

fn to_driver(record: &CookieRecord) -> Result<Cookie> {
    Ok(serde_json::from_value(serde_json::to_value(record)?)?)
}

fn from_driver(cookie: &Cookie) -> Result<CookieRecord> {
    Ok(serde_json::from_value(serde_json::to_value(cookie)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resoshare_core::SameSite;

    fn record() -> CookieRecord {
        CookieRecord {
            name: SESSION_COOKIE.into(),
            value: "f00".into(),
            path: "/".into(),
            secure: false,
            http_only: true,
            same_site: SameSite::None,
            domain: Some("office.reso.ru".into()),
        }
    }

    #[test]
    fn test_round_trip_through_driver_cookie() {
        let original = record();
        let driver_cookie = to_driver(&original).unwrap();
        let back = from_driver(&driver_cookie).unwrap();
        assert_eq!(back.name, original.name);
        assert_eq!(back.value, original.value);
        assert_eq!(back.path, original.path);
        assert_eq!(back.domain, original.domain);
        assert_eq!(back.same_site, original.same_site);
    }

    #[test]
    fn test_driver_cookie_uses_wire_names() {
        let driver_cookie = to_driver(&record()).unwrap();
        let raw = serde_json::to_value(&driver_cookie).unwrap();
        assert_eq!(raw["name"], SESSION_COOKIE);
        assert_eq!(raw["sameSite"], "None");
    }
}
