//! Supervisor loop — polling cadence and top-level fault handling.

use std::time::Duration;

use tracing::{debug, warn};

use resoshare_browser::BrowserSession;
use resoshare_core::{BrowserFault, Error};
use resoshare_store::SharedStore;

use crate::engine::ReconciliationEngine;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Print a diagnostic and terminate with a failure status. Every fatal
/// condition funnels through here; no error surfaces past this boundary.
pub fn fatal(message: impl std::fmt::Display) -> ! {
    println!("{message}");
    std::process::exit(1);
}

/// Drive the engine once per second until the process is terminated
/// externally or a fault ends the session.
pub async fn run<S, B>(mut engine: ReconciliationEngine<S, B>) -> !
where
    S: SharedStore,
    B: BrowserSession,
{
    if let Err(err) = engine.bootstrap().await {
        dispose(&mut engine, err).await;
    }
    loop {
        if let Err(err) = engine.tick().await {
            dispose(&mut engine, err).await;
        }
        tokio::time::sleep(TICK_INTERVAL).await;
    }
}

/// Apply the fault taxonomy: swallow what a later tick will absorb, recover
/// the window where possible, exit 0 on dead-browser conditions, and route
/// everything else through `fatal`.
async fn dispose<S, B>(engine: &mut ReconciliationEngine<S, B>, err: Error)
where
    S: SharedStore,
    B: BrowserSession,
{
    match err {
        Error::Browser(BrowserFault::AlertOpen | BrowserFault::CookieDomainMismatch) => {
            debug!("Ignoring recoverable browser fault: {err}");
        }
        Error::Browser(BrowserFault::WindowClosed) => match engine.recover_window().await {
            Ok(true) => debug!("Switched to a surviving browser window"),
            _ => {
                warn!("No browser window left, shutting down");
                let _ = engine.shutdown().await;
                std::process::exit(0);
            }
        },
        Error::Browser(BrowserFault::SessionGone) => std::process::exit(0),
        Error::Browser(fault) => {
            warn!("Unrecoverable browser fault: {fault}");
            let _ = engine.shutdown().await;
            std::process::exit(0);
        }
        err => {
            let _ = engine.shutdown().await;
            fatal(err);
        }
    }
}
