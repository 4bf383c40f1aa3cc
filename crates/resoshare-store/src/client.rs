//! Telegram pinned-message client — the shared store lives in the text of
//! one pinned chat message, a JSON object keyed by account hash.
//!
//! Every write replaces the whole object (read-modify-write, last writer
//! wins). The store offers no transactional isolation; racing writers are
//! reconciled by the polling loop, not here.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use resoshare_core::{CookieSnapshot, Error, Result};

use crate::retry::RetryPolicy;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Read/write access to named cookie snapshots, keyed by account hash.
///
/// `get` returning `None` means the account key does not exist — callers
/// must treat that as fatal for the session, not as an empty snapshot.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, account: &str) -> Result<Option<CookieSnapshot>>;
    async fn set(&self, account: &str, snapshot: &CookieSnapshot) -> Result<()>;
}

/// Store client speaking the Telegram Bot API over HTTP.
pub struct PinnedStore {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    chat_id: i64,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Deserialize)]
struct ChatInfo {
    #[serde(default)]
    pinned_message: Option<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    message_id: i64,
    #[serde(default)]
    text: Option<String>,
}

impl PinnedStore {
    /// Client against the production Telegram API.
    pub fn new(token: impl Into<String>, chat_id: i64) -> Self {
        Self::with_endpoint(TELEGRAM_API, token, chat_id)
    }

    /// Client against an explicit API endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>, token: impl Into<String>, chat_id: i64) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token: token.into(),
            chat_id,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Provision an account with the placeholder snapshot. Admin flow, not
    /// used by the reconciliation loop.
    pub async fn add_account(&self, account: &str) -> Result<()> {
        self.retry
            .run("add account", || async move {
                let pinned = self.pinned().await?;
                let mut accounts = accounts_of(&pinned)?;
                accounts.insert(
                    account.to_string(),
                    serde_json::to_value(CookieSnapshot::sample())?,
                );
                self.write(pinned.message_id, &accounts).await
            })
            .await?;
        info!("Provisioned account {account}");
        Ok(())
    }

    /// Drop an account from the store. Admin flow.
    pub async fn remove_account(&self, account: &str) -> Result<()> {
        self.retry
            .run("remove account", || async move {
                let pinned = self.pinned().await?;
                let mut accounts = accounts_of(&pinned)?;
                if accounts.remove(account).is_none() {
                    return Err(Error::InvalidAccount(account.to_string()));
                }
                self.write(pinned.message_id, &accounts).await
            })
            .await?;
        info!("Removed account {account}");
        Ok(())
    }

    /// Reset the store to its seed state, creating and pinning the message
    /// if the chat has none.
    pub async fn reinit(&self) -> Result<()> {
        self.retry
            .run("reinit store", || async move {
                let chat = self.chat_info().await?;
                match chat.pinned_message {
                    Some(pinned) => self.write(pinned.message_id, &seed_accounts()?).await,
                    None => self.bootstrap_pinned().await,
                }
            })
            .await?;
        info!("Store reset to seed state");
        Ok(())
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value> {
        let url = format!("{}/bot{}/{}", self.endpoint, self.token, method);
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Store(format!("{method}: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(Error::Store(format!("{method}: service returned {status}")));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| Error::Store(format!("{method}: invalid response: {e}")))?;
        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| "unknown error".into());
            // editing a message to its current text is a no-op, not a fault
            if description.contains("message is not modified") {
                return Ok(Value::Null);
            }
            return Err(Error::Store(format!("{method}: {description}")));
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    async fn chat_info(&self) -> Result<ChatInfo> {
        let chat = self.call("getChat", json!({ "chat_id": self.chat_id })).await?;
        Ok(serde_json::from_value(chat)?)
    }

    /// The pinned message, creating it from the seed state if the chat has
    /// none yet.
    async fn pinned(&self) -> Result<MessageRef> {
        if let Some(pinned) = self.chat_info().await?.pinned_message {
            return Ok(pinned);
        }
        debug!("No pinned message in chat {}, bootstrapping", self.chat_id);
        self.bootstrap_pinned().await?;
        self.chat_info().await?.pinned_message.ok_or_else(|| {
            Error::Store("pinned message missing right after bootstrap".into())
        })
    }

    async fn bootstrap_pinned(&self) -> Result<()> {
        let text = serde_json::to_string(&seed_accounts()?)?;
        let message = self
            .call("sendMessage", json!({ "chat_id": self.chat_id, "text": text }))
            .await?;
        let message: MessageRef = serde_json::from_value(message)?;
        self.call(
            "pinChatMessage",
            json!({ "chat_id": self.chat_id, "message_id": message.message_id }),
        )
        .await?;
        Ok(())
    }

    async fn write(&self, message_id: i64, accounts: &Map<String, Value>) -> Result<()> {
        let text = serde_json::to_string(accounts)?;
        self.call(
            "editMessageText",
            json!({ "chat_id": self.chat_id, "message_id": message_id, "text": text }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SharedStore for PinnedStore {
    async fn get(&self, account: &str) -> Result<Option<CookieSnapshot>> {
        self.retry
            .run("get cookies", || async move {
                let pinned = self.pinned().await?;
                let accounts = accounts_of(&pinned)?;
                match accounts.get(account) {
                    Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn set(&self, account: &str, snapshot: &CookieSnapshot) -> Result<()> {
        self.retry
            .run("set cookies", || async move {
                let pinned = self.pinned().await?;
                let mut accounts = accounts_of(&pinned)?;
                accounts.insert(account.to_string(), serde_json::to_value(snapshot)?);
                self.write(pinned.message_id, &accounts).await
            })
            .await?;
        debug!("Pushed snapshot for account {account}");
        Ok(())
    }
}

/// Decode the account map out of the pinned message text. Unknown accounts
/// are carried through untouched so one writer never clobbers another's
/// entries.
fn accounts_of(pinned: &MessageRef) -> Result<Map<String, Value>> {
    let text = pinned.text.as_deref().unwrap_or_default();
    if text.is_empty() {
        return Ok(Map::new());
    }
    Ok(serde_json::from_str(text)?)
}

fn seed_accounts() -> Result<Map<String, Value>> {
    let mut accounts = Map::new();
    accounts.insert("test".into(), serde_json::to_value(CookieSnapshot::sample())?);
    Ok(accounts)
}
