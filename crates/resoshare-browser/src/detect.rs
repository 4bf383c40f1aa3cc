//! WebDriver capabilities for the supported browser families.
//!
//! The family is picked once at startup from configuration; each family
//! needs the user-agent override wired differently (Firefox takes a profile
//! preference, the Chromium-based ones a command-line argument).

use thirtyfour::prelude::*;
use thirtyfour::common::capabilities::firefox::FirefoxPreferences;
use thirtyfour::Capabilities;

use resoshare_core::{BrowserFault, BrowserKind, Result};

/// Build session capabilities for the configured browser family with the
/// user-agent override applied.
pub fn capabilities_for(kind: BrowserKind, user_agent: &str) -> Result<Capabilities> {
    let caps = match kind {
        BrowserKind::Firefox => {
            let mut prefs = FirefoxPreferences::new();
            prefs
                .set("general.useragent.override", user_agent)
                .map_err(driver_fault)?;
            let mut caps = DesiredCapabilities::firefox();
            caps.set_preferences(prefs).map_err(driver_fault)?;
            caps.into()
        }
        BrowserKind::Chrome => {
            let mut caps = DesiredCapabilities::chrome();
            caps.add_arg(&format!("--user-agent={user_agent}"))
                .map_err(driver_fault)?;
            caps.into()
        }
        BrowserKind::Edge => {
            let mut caps = DesiredCapabilities::edge();
            caps.add_arg(&format!("--user-agent={user_agent}"))
                .map_err(driver_fault)?;
            caps.into()
        }
    };
    Ok(caps)
}

fn driver_fault(err: thirtyfour::error::WebDriverError) -> resoshare_core::Error {
    BrowserFault::Other(err.to_string()).into()
}
