//! Reconciliation engine — the three-way comparison between the local
//! cache, the live browser jar, and the remote snapshot.
//!
//! The three comparisons answer different questions: did *this* browser
//! cause a cookie change (push it), did the remote store change
//! independently (adopt it), or did nothing move (wait). At most one
//! corrective action is applied per tick; cross-process races converge over
//! a few polling intervals rather than atomically.

use tracing::{debug, info};

use resoshare_browser::{read_snapshot, BrowserSession};
use resoshare_core::{CookieSnapshot, Error, Result, OFFICE_COOKIE, PORTAL_URL, SESSION_COOKIE};
use resoshare_store::SharedStore;

pub struct ReconciliationEngine<S, B> {
    store: S,
    session: B,
    account: String,
    /// The snapshot this engine most recently reconciled. Owned exclusively
    /// here, mutated only inside `tick()` and `bootstrap()`.
    last_cookies: Option<CookieSnapshot>,
    /// Set while signed out with browser and store in agreement: the next
    /// observed signed-in state came from a manual login and must be
    /// published.
    pending_push: bool,
}

impl<S: SharedStore, B: BrowserSession> ReconciliationEngine<S, B> {
    pub fn new(store: S, session: B, account: impl Into<String>) -> Self {
        Self {
            store,
            session,
            account: account.into(),
            last_cookies: None,
            pending_push: false,
        }
    }

    /// One-time startup: load the portal, apply the stored snapshot, reload.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.session.navigate(PORTAL_URL).await?;
        let remote = self.fetch_remote().await?;
        self.adopt(remote).await?;
        self.session.navigate(PORTAL_URL).await?;
        info!("Bootstrapped session for account {}", self.account);
        Ok(())
    }

    /// One polling iteration.
    pub async fn tick(&mut self) -> Result<()> {
        let remote = self.fetch_remote().await?;

        if self.session.auth_complete().await? {
            let browser = read_snapshot(&self.session).await?;
            if self.pending_push {
                // somebody just logged in through this browser
                self.store.set(&self.account, &browser).await?;
                self.pending_push = false;
                info!("Published cookies from a fresh login");
            } else if self.last_cookies.as_ref() != Some(&browser) {
                // the server rotated our session cookies under us
                self.store.set(&self.account, &browser).await?;
                self.last_cookies = Some(browser);
                info!("Pushed rotated session cookies");
            } else if browser != remote {
                // someone else pushed different cookies, ours still work
                self.adopt(remote).await?;
                info!("Adopted remote cookies while signed in");
            }
        } else if self.last_cookies.as_ref() != Some(&remote) {
            // the store holds a snapshot we have not applied yet
            self.adopt(remote).await?;
            self.session.navigate(PORTAL_URL).await?;
            info!("Adopted remote cookies and reloaded the portal");
        } else {
            if !self.pending_push {
                debug!("Signed out and in agreement with the store; awaiting a manual login");
            }
            self.pending_push = true;
        }
        Ok(())
    }

    /// After the active window died, try to adopt another open one.
    pub async fn recover_window(&self) -> Result<bool> {
        self.session.recover_window().await
    }

    /// Tear down the browser session.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.session.quit().await
    }

    async fn fetch_remote(&self) -> Result<CookieSnapshot> {
        match self.store.get(&self.account).await? {
            Some(snapshot) => Ok(snapshot),
            None => Err(Error::InvalidAccount(self.account.clone())),
        }
    }

    /// Replace the browser's tracked cookies with the remote snapshot and
    /// remember it as reconciled.
    async fn adopt(&mut self, remote: CookieSnapshot) -> Result<()> {
        self.session.delete_cookie(SESSION_COOKIE).await?;
        self.session.delete_cookie(OFFICE_COOKIE).await?;
        for record in remote.for_insertion() {
            self.session.set_cookie(&record).await?;
        }
        self.last_cookies = Some(remote);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use resoshare_core::{CookieRecord, SameSite};

    fn record(name: &str, value: &str) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            value: value.into(),
            path: "/".into(),
            secure: false,
            http_only: false,
            same_site: SameSite::None,
            domain: None,
        }
    }

    /// A snapshot already in the canonical store-side shape.
    fn snapshot(session_value: &str, office_value: &str) -> CookieSnapshot {
        CookieSnapshot {
            session: record(SESSION_COOKIE, session_value),
            office: record(OFFICE_COOKIE, office_value),
        }
    }

    #[derive(Default, Clone)]
    struct FakeStore {
        accounts: Arc<Mutex<HashMap<String, CookieSnapshot>>>,
        writes: Arc<Mutex<Vec<CookieSnapshot>>>,
    }

    impl FakeStore {
        fn with_account(account: &str, snapshot: CookieSnapshot) -> Self {
            let store = Self::default();
            store
                .accounts
                .lock()
                .unwrap()
                .insert(account.into(), snapshot);
            store
        }

        fn empty() -> Self {
            Self::default()
        }

        fn writes(&self) -> Vec<CookieSnapshot> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SharedStore for FakeStore {
        async fn get(&self, account: &str) -> Result<Option<CookieSnapshot>> {
            Ok(self.accounts.lock().unwrap().get(account).cloned())
        }

        async fn set(&self, account: &str, snapshot: &CookieSnapshot) -> Result<()> {
            self.accounts
                .lock()
                .unwrap()
                .insert(account.into(), snapshot.clone());
            self.writes.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct FakeBrowser {
        jar: Arc<Mutex<HashMap<String, CookieRecord>>>,
        authed: Arc<AtomicBool>,
        navigations: Arc<Mutex<Vec<String>>>,
        cookie_ops: Arc<AtomicUsize>,
    }

    impl FakeBrowser {
        fn signed_out() -> Self {
            Self::default()
        }

        fn signed_in_with(snapshot: &CookieSnapshot) -> Self {
            let browser = Self::default();
            browser.authed.store(true, Ordering::SeqCst);
            browser.fill(snapshot);
            browser
        }

        fn fill(&self, snapshot: &CookieSnapshot) {
            let mut jar = self.jar.lock().unwrap();
            for record in snapshot.for_insertion() {
                jar.insert(record.name.clone(), record);
            }
        }

        fn jar(&self) -> HashMap<String, CookieRecord> {
            self.jar.lock().unwrap().clone()
        }

        fn navigations(&self) -> Vec<String> {
            self.navigations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrowserSession for FakeBrowser {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.navigations.lock().unwrap().push(url.into());
            Ok(())
        }

        async fn get_cookie(&self, name: &str) -> Result<Option<CookieRecord>> {
            self.cookie_ops.fetch_add(1, Ordering::SeqCst);
            Ok(self.jar.lock().unwrap().get(name).cloned())
        }

        async fn set_cookie(&self, record: &CookieRecord) -> Result<()> {
            self.cookie_ops.fetch_add(1, Ordering::SeqCst);
            self.jar
                .lock()
                .unwrap()
                .insert(record.name.clone(), record.clone());
            Ok(())
        }

        async fn delete_cookie(&self, name: &str) -> Result<()> {
            self.cookie_ops.fetch_add(1, Ordering::SeqCst);
            self.jar.lock().unwrap().remove(name);
            Ok(())
        }

        async fn auth_complete(&self) -> Result<bool> {
            Ok(self.authed.load(Ordering::SeqCst))
        }

        async fn recover_window(&self) -> Result<bool> {
            Ok(false)
        }

        async fn quit(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn engine(
        store: &FakeStore,
        browser: &FakeBrowser,
    ) -> ReconciliationEngine<FakeStore, FakeBrowser> {
        ReconciliationEngine::new(store.clone(), browser.clone(), "op")
    }

    #[tokio::test]
    async fn test_bootstrap_applies_remote_and_reloads() {
        let remote = snapshot("A", "B");
        let store = FakeStore::with_account("op", remote.clone());
        let browser = FakeBrowser::signed_out();
        let mut engine = engine(&store, &browser);

        engine.bootstrap().await.unwrap();

        assert_eq!(browser.navigations(), vec![PORTAL_URL, PORTAL_URL]);
        assert_eq!(engine.last_cookies, Some(remote));
        let jar = browser.jar();
        assert_eq!(jar[SESSION_COOKIE].value, "A");
        assert_eq!(jar[OFFICE_COOKIE].value, "B");
        assert!(jar.values().all(|r| r.domain.is_none()));
    }

    #[tokio::test]
    async fn test_missing_account_is_fatal_before_any_cookie_op() {
        let store = FakeStore::empty();
        let browser = FakeBrowser::signed_out();
        let mut engine = engine(&store, &browser);

        let err = engine.tick().await.unwrap_err();
        assert!(matches!(err, Error::InvalidAccount(_)));
        assert_eq!(browser.cookie_ops.load(Ordering::SeqCst), 0);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_signed_out_convergence_in_one_tick() {
        let remote = snapshot("A", "B");
        let store = FakeStore::with_account("op", remote.clone());
        let browser = FakeBrowser::signed_out();
        let mut engine = engine(&store, &browser);
        engine.last_cookies = Some(snapshot("stale", "stale"));

        engine.tick().await.unwrap();

        assert_eq!(engine.last_cookies, Some(remote));
        assert_eq!(browser.jar()[SESSION_COOKIE].value, "A");
        assert_eq!(browser.navigations(), vec![PORTAL_URL]);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_adoption_is_idempotent() {
        let remote = snapshot("A", "B");
        let store = FakeStore::with_account("op", remote.clone());
        let browser = FakeBrowser::signed_out();
        browser.fill(&remote);
        let mut engine = engine(&store, &browser);
        engine.last_cookies = Some(remote);

        let jar_before = browser.jar();
        engine.tick().await.unwrap();

        assert_eq!(browser.jar(), jar_before);
        assert!(browser.navigations().is_empty());
        assert!(store.writes().is_empty());
        assert!(engine.pending_push);
    }

    #[tokio::test]
    async fn test_push_on_login() {
        let fresh = snapshot("fresh-sess", "fresh-office");
        let store = FakeStore::with_account("op", snapshot("old", "old"));
        let browser = FakeBrowser::signed_in_with(&fresh);
        let mut engine = engine(&store, &browser);
        engine.pending_push = true;

        engine.tick().await.unwrap();

        assert_eq!(store.writes(), vec![fresh]);
        assert!(!engine.pending_push);
        // the cache intentionally lags; the next tick reconciles it
        assert_eq!(engine.last_cookies, None);
    }

    #[tokio::test]
    async fn test_precedence_browser_wins_when_all_three_differ() {
        let in_browser = snapshot("browser", "browser");
        let store = FakeStore::with_account("op", snapshot("remote", "remote"));
        let browser = FakeBrowser::signed_in_with(&in_browser);
        let mut engine = engine(&store, &browser);
        engine.last_cookies = Some(snapshot("cache", "cache"));

        engine.tick().await.unwrap();

        assert_eq!(store.writes(), vec![in_browser.clone()]);
        assert_eq!(engine.last_cookies, Some(in_browser));
        // no adoption happened
        assert_eq!(browser.jar()[SESSION_COOKIE].value, "browser");
    }

    #[tokio::test]
    async fn test_server_rotation_is_pushed() {
        let rotated = snapshot("rotated", "same");
        let store = FakeStore::with_account("op", snapshot("known", "same"));
        let browser = FakeBrowser::signed_in_with(&rotated);
        let mut engine = engine(&store, &browser);
        engine.last_cookies = Some(snapshot("known", "same"));

        engine.tick().await.unwrap();

        assert_eq!(store.writes(), vec![rotated.clone()]);
        assert_eq!(engine.last_cookies, Some(rotated));
    }

    #[tokio::test]
    async fn test_foreign_remote_update_is_adopted_while_signed_in() {
        let mine = snapshot("mine", "mine");
        let theirs = snapshot("theirs", "theirs");
        let store = FakeStore::with_account("op", theirs.clone());
        let browser = FakeBrowser::signed_in_with(&mine);
        let mut engine = engine(&store, &browser);
        engine.last_cookies = Some(mine);

        engine.tick().await.unwrap();

        assert_eq!(engine.last_cookies, Some(theirs));
        assert_eq!(browser.jar()[SESSION_COOKIE].value, "theirs");
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_example_scenario_two_ticks() {
        let remote = snapshot("A", "B");
        let store = FakeStore::with_account("op", remote.clone());
        let browser = FakeBrowser::signed_out();
        let mut engine = engine(&store, &browser);

        // Tick 1: empty cache differs from remote — adopt and reload.
        engine.tick().await.unwrap();
        assert_eq!(engine.last_cookies, Some(remote));
        assert_eq!(browser.navigations(), vec![PORTAL_URL]);

        // Tick 2: still signed out, nothing changed — only arm the push flag.
        let jar_before = browser.jar();
        engine.tick().await.unwrap();
        assert!(engine.pending_push);
        assert_eq!(browser.jar(), jar_before);
        assert_eq!(browser.navigations(), vec![PORTAL_URL]);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_browser_snapshot_is_fatal() {
        let store = FakeStore::with_account("op", snapshot("A", "B"));
        let browser = FakeBrowser::signed_out();
        browser.authed.store(true, Ordering::SeqCst);
        browser
            .jar
            .lock()
            .unwrap()
            .insert(SESSION_COOKIE.into(), record(SESSION_COOKIE, "only-one"));
        let mut engine = engine(&store, &browser);

        let err = engine.tick().await.unwrap_err();
        assert!(matches!(err, Error::IncompleteCookies));
        assert!(store.writes().is_empty());
    }
}
