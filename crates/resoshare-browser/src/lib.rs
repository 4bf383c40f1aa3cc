//! Browser session adapter — cookie access and the auth-state probe over a
//! real WebDriver-controlled browser.

pub mod detect;
pub mod session;

pub use detect::capabilities_for;
pub use session::{read_snapshot, BrowserSession, PortalSession};
