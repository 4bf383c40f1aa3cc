//! Resoshare Core — cookie snapshot model, configuration, errors.

pub mod config;
pub mod cookie;
pub mod error;

pub use config::{BrowserKind, Options};
pub use cookie::{CookieRecord, CookieSnapshot, SameSite, OFFICE_COOKIE, PORTAL_URL, SESSION_COOKIE};
pub use error::{BrowserFault, Error, Result};
