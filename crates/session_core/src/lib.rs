//! Session orchestration over an external ledger client.
//!
//! The orchestrator owns one ledger-client handle, a small set of session
//! identifiers, and a human-readable status feed. Every user-triggered
//! action validates its preconditions against session state, issues its
//! ledger calls in order, and republishes status and view state. A failed
//! action leaves the session at its last successfully completed stage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledger::{LedgerClient, LedgerConnector};
use serde::Serialize;
use shared::domain::{AccountId, FaucetId, KeyReference, NoteId, StorageMode};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod config;
pub use config::{CounterpartyEntry, SessionSettings, TokenSettings, TransferSettings};

/// Linear progress of the demo workflow. Failures never move the stage
/// backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Uninitialized,
    Initialized,
    AccountReady,
    FaucetReady,
    Minted,
    NotesFetched,
    Consumed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StatusUpdated(StatusLine),
    StageChanged(SessionStage),
    CounterpartySelected(AccountId),
    Error(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("ledger client is not initialized")]
    NotInitialized,
    #[error("ledger client is already initialized")]
    AlreadyInitialized,
    #[error("account already created: {0}")]
    AccountExists(AccountId),
    #[error("faucet already created: {0}")]
    FaucetExists(FaucetId),
    #[error("create an account first")]
    MissingAccount,
    #[error("create a faucet first")]
    MissingFaucet,
    #[error("no counterparty selected")]
    NoCounterpartySelected,
    #[error("unknown counterparty {0}")]
    UnknownCounterparty(AccountId),
    #[error("no tokens found")]
    NoMintedNotes,
    #[error("no notes fetched")]
    EmptyNoteSet,
    #[error("another action is already in flight, refusing {0}")]
    Busy(&'static str),
    #[error("{0}")]
    Ledger(String),
}

/// Derived view state republished after each action.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub stage: SessionStage,
    pub account_id: Option<AccountId>,
    pub faucet_id: Option<FaucetId>,
    pub selected_counterparty: Option<AccountId>,
    pub minted_notes: Option<Vec<NoteId>>,
    pub note_set: Vec<NoteId>,
    pub status: Option<StatusLine>,
    pub account_info: Option<serde_json::Value>,
    pub busy: bool,
}

struct SessionState {
    client: Option<Arc<dyn LedgerClient>>,
    stage: SessionStage,
    account_id: Option<AccountId>,
    faucet_id: Option<FaucetId>,
    selected_counterparty: Option<AccountId>,
    minted_notes: Option<Vec<NoteId>>,
    note_set: Vec<NoteId>,
    status: Option<StatusLine>,
    account_info: Option<serde_json::Value>,
    busy: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            client: None,
            stage: SessionStage::Uninitialized,
            account_id: None,
            faucet_id: None,
            selected_counterparty: None,
            minted_notes: None,
            note_set: Vec::new(),
            status: None,
            account_info: None,
            busy: false,
        }
    }
}

pub struct SessionOrchestrator {
    connector: Arc<dyn LedgerConnector>,
    settings: SessionSettings,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionOrchestrator {
    pub fn new(settings: SessionSettings, connector: Arc<dyn LedgerConnector>) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            connector,
            settings,
            inner: Mutex::new(SessionState::new()),
            events,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock().await;
        SessionSnapshot {
            stage: state.stage,
            account_id: state.account_id.clone(),
            faucet_id: state.faucet_id.clone(),
            selected_counterparty: state.selected_counterparty.clone(),
            minted_notes: state.minted_notes.clone(),
            note_set: state.note_set.clone(),
            status: state.status.clone(),
            account_info: state.account_info.clone(),
            busy: state.busy,
        }
    }

    fn record_status(&self, state: &mut SessionState, message: impl Into<String>) {
        let line = StatusLine {
            at: Utc::now(),
            message: message.into(),
        };
        state.status = Some(line.clone());
        let _ = self.events.send(SessionEvent::StatusUpdated(line));
    }

    fn advance_stage(&self, state: &mut SessionState, stage: SessionStage) {
        if stage > state.stage {
            state.stage = stage;
            let _ = self.events.send(SessionEvent::StageChanged(stage));
        }
    }

    async fn set_step_status(&self, message: &str) {
        let mut state = self.inner.lock().await;
        self.record_status(&mut state, message);
    }

    /// Admission check for a remote action: refuses while another action is
    /// in flight (without touching the status feed), refuses before
    /// initialization, then runs `prepare` under the same lock and marks the
    /// session busy.
    async fn begin_action<T>(
        &self,
        action: &'static str,
        prepare: impl FnOnce(&SessionState) -> Result<T, SessionError>,
    ) -> Result<(Arc<dyn LedgerClient>, T), SessionError> {
        let mut state = self.inner.lock().await;
        if state.busy {
            return Err(SessionError::Busy(action));
        }
        let Some(client) = state.client.clone() else {
            let err = SessionError::NotInitialized;
            self.record_status(&mut state, err.to_string());
            return Err(err);
        };
        match prepare(&state) {
            Ok(context) => {
                state.busy = true;
                Ok((client, context))
            }
            Err(err) => {
                self.record_status(&mut state, err.to_string());
                Err(err)
            }
        }
    }

    async fn fail_remote(
        &self,
        action: &'static str,
        context: &str,
        err: anyhow::Error,
    ) -> SessionError {
        let message = format!("{context}: {err}");
        {
            let mut state = self.inner.lock().await;
            state.busy = false;
            self.record_status(&mut state, message.clone());
        }
        let _ = self.events.send(SessionEvent::Error(message));
        warn!(action, error = %err, "session: action failed");
        SessionError::Ledger(err.to_string())
    }

    /// Establish the ledger-client handle. Refused once a handle exists;
    /// on failure the handle stays unset and every other remote action will
    /// refuse with a "not initialized" status.
    pub async fn initialize(&self, endpoint: &str) -> Result<(), SessionError> {
        {
            let mut state = self.inner.lock().await;
            if state.busy {
                return Err(SessionError::Busy("initialize"));
            }
            if state.client.is_some() {
                let err = SessionError::AlreadyInitialized;
                self.record_status(&mut state, err.to_string());
                return Err(err);
            }
            state.busy = true;
        }
        info!(endpoint, "session: initializing ledger client");
        match self.connector.connect(endpoint).await {
            Ok(client) => {
                let mut state = self.inner.lock().await;
                state.busy = false;
                state.client = Some(client);
                self.advance_stage(&mut state, SessionStage::Initialized);
                self.record_status(&mut state, "Ledger client initialized");
                Ok(())
            }
            Err(err) => {
                Err(self
                    .fail_remote("initialize", "Error initializing client", err)
                    .await)
            }
        }
    }

    pub async fn create_account(&self) -> Result<AccountId, SessionError> {
        let (client, ()) = self
            .begin_action("create_account", |state| {
                if let Some(existing) = &state.account_id {
                    return Err(SessionError::AccountExists(existing.clone()));
                }
                Ok(())
            })
            .await?;

        match client.create_wallet(StorageMode::OffChain, true).await {
            Ok(id) => {
                let mut state = self.inner.lock().await;
                state.busy = false;
                state.account_id = Some(id.clone());
                self.advance_stage(&mut state, SessionStage::AccountReady);
                self.record_status(&mut state, format!("Account created: {id}"));
                info!(account = %id, "session: account created");
                Ok(id)
            }
            Err(err) => {
                Err(self
                    .fail_remote("create_account", "Error creating account", err)
                    .await)
            }
        }
    }

    pub async fn create_faucet(&self) -> Result<FaucetId, SessionError> {
        let (client, ()) = self
            .begin_action("create_faucet", |state| {
                if let Some(existing) = &state.faucet_id {
                    return Err(SessionError::FaucetExists(existing.clone()));
                }
                Ok(())
            })
            .await?;

        let token = &self.settings.token;
        match client
            .create_faucet(
                StorageMode::OffChain,
                false,
                &token.symbol,
                token.decimals,
                token.max_supply,
            )
            .await
        {
            Ok(id) => {
                let mut state = self.inner.lock().await;
                state.busy = false;
                state.faucet_id = Some(id.clone());
                self.advance_stage(&mut state, SessionStage::FaucetReady);
                self.record_status(&mut state, format!("Faucet created: {id}"));
                info!(faucet = %id, symbol = %token.symbol, "session: faucet created");
                Ok(id)
            }
            Err(err) => {
                Err(self
                    .fail_remote("create_faucet", "Error creating faucet", err)
                    .await)
            }
        }
    }

    /// Pure state update; the id must belong to the configured counterparty
    /// set. Last write wins.
    pub async fn select_counterparty(&self, id: &AccountId) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if self.settings.counterparty(id).is_none() {
            let err = SessionError::UnknownCounterparty(id.clone());
            self.record_status(&mut state, err.to_string());
            return Err(err);
        }
        state.selected_counterparty = Some(id.clone());
        drop(state);
        let _ = self.events.send(SessionEvent::CounterpartySelected(id.clone()));
        Ok(())
    }

    /// Mint the configured amount to the selected counterparty.
    ///
    /// The call order is load-bearing: the faucet's authentication must be
    /// cached before the mint, and state must be resynchronized after the
    /// transaction is mined so later note lookups observe it.
    pub async fn mint_tokens(&self) -> Result<Vec<NoteId>, SessionError> {
        let (client, (faucet, recipient)) = self
            .begin_action("mint_tokens", |state| {
                if state.account_id.is_none() {
                    return Err(SessionError::MissingAccount);
                }
                let faucet = state.faucet_id.clone().ok_or(SessionError::MissingFaucet)?;
                let recipient = state
                    .selected_counterparty
                    .clone()
                    .ok_or(SessionError::NoCounterpartySelected)?;
                Ok((faucet, recipient))
            })
            .await?;

        self.set_step_status("Syncing state...").await;
        if let Err(err) = client.sync_state().await {
            return Err(self
                .fail_remote("mint_tokens", "Error minting tokens", err)
                .await);
        }

        self.set_step_status("Fetching and caching faucet auth...").await;
        if let Err(err) = client
            .cache_auth(&KeyReference::Faucet(faucet.clone()))
            .await
        {
            return Err(self
                .fail_remote("mint_tokens", "Error minting tokens", err)
                .await);
        }

        self.set_step_status("Minting tokens...").await;
        let mint = self.settings.mint;
        let outcome = match client
            .mint(&recipient, &faucet, mint.visibility, mint.amount)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(self
                    .fail_remote("mint_tokens", "Error minting tokens", err)
                    .await)
            }
        };

        self.set_step_status("Syncing state again...").await;
        if let Err(err) = client.sync_state().await {
            return Err(self
                .fail_remote("mint_tokens", "Error minting tokens", err)
                .await);
        }

        let notes = outcome.created_notes;
        let mut state = self.inner.lock().await;
        state.busy = false;
        state.minted_notes = Some(notes.clone());
        self.advance_stage(&mut state, SessionStage::Minted);
        self.record_status(
            &mut state,
            format!(
                "Minted {} {} to {recipient}",
                mint.amount, self.settings.token.symbol
            ),
        );
        info!(recipient = %recipient, notes = notes.len(), "session: mint complete");
        Ok(notes)
    }

    /// Copy the last mint's created notes into the consumable note set.
    pub async fn fetch_notes(&self) -> Result<Vec<NoteId>, SessionError> {
        let mut state = self.inner.lock().await;
        if state.busy {
            return Err(SessionError::Busy("fetch_notes"));
        }
        let Some(minted) = state.minted_notes.clone() else {
            let err = SessionError::NoMintedNotes;
            self.record_status(&mut state, err.to_string());
            return Err(err);
        };
        state.note_set = minted.clone();
        self.advance_stage(&mut state, SessionStage::NotesFetched);
        self.record_status(&mut state, format!("Fetched {} notes", minted.len()));
        Ok(minted)
    }

    /// Consume the fetched notes under the selected counterparty.
    pub async fn consume_notes(&self) -> Result<(), SessionError> {
        let (client, (owner, notes)) = self
            .begin_action("consume_notes", |state| {
                let owner = state
                    .selected_counterparty
                    .clone()
                    .ok_or(SessionError::NoCounterpartySelected)?;
                if state.note_set.is_empty() {
                    return Err(SessionError::EmptyNoteSet);
                }
                Ok((owner, state.note_set.clone()))
            })
            .await?;

        self.set_step_status("Fetching and caching account auth...").await;
        if let Err(err) = client
            .cache_auth(&KeyReference::Account(owner.clone()))
            .await
        {
            return Err(self
                .fail_remote("consume_notes", "Error consuming notes", err)
                .await);
        }

        self.set_step_status("Consuming notes...").await;
        match client.consume(&owner, &notes).await {
            Ok(_) => {
                let mut state = self.inner.lock().await;
                state.busy = false;
                state.note_set.clear();
                self.advance_stage(&mut state, SessionStage::Consumed);
                self.record_status(
                    &mut state,
                    format!("Consumed {} notes for {owner}", notes.len()),
                );
                info!(owner = %owner, notes = notes.len(), "session: notes consumed");
                Ok(())
            }
            Err(err) => {
                Err(self
                    .fail_remote("consume_notes", "Error consuming notes", err)
                    .await)
            }
        }
    }

    /// Send the configured amount from the session account to `recipient`.
    pub async fn send_tokens(&self, recipient: &AccountId) -> Result<(), SessionError> {
        let (client, (sender, faucet)) = self
            .begin_action("send_tokens", |state| {
                let sender = state.account_id.clone().ok_or(SessionError::MissingAccount)?;
                let faucet = state.faucet_id.clone().ok_or(SessionError::MissingFaucet)?;
                Ok((sender, faucet))
            })
            .await?;

        self.set_step_status("Fetching and caching account auth...").await;
        if let Err(err) = client
            .cache_auth(&KeyReference::Account(sender.clone()))
            .await
        {
            return Err(self
                .fail_remote("send_tokens", "Error sending tokens", err)
                .await);
        }

        self.set_step_status("Sending tokens...").await;
        let send = self.settings.send;
        match client
            .send(&sender, recipient, &faucet, send.visibility, send.amount)
            .await
        {
            Ok(_) => {
                let mut state = self.inner.lock().await;
                state.busy = false;
                self.record_status(
                    &mut state,
                    format!(
                        "Sent {} {} from {sender} to {recipient}",
                        send.amount, self.settings.token.symbol
                    ),
                );
                info!(sender = %sender, recipient = %recipient, "session: tokens sent");
                Ok(())
            }
            Err(err) => {
                Err(self
                    .fail_remote("send_tokens", "Error sending tokens", err)
                    .await)
            }
        }
    }

    /// Resynchronize the local view of chain state. Idempotent.
    pub async fn sync_state(&self) -> Result<(), SessionError> {
        let (client, ()) = self.begin_action("sync_state", |_| Ok(())).await?;

        self.set_step_status("Syncing state...").await;
        match client.sync_state().await {
            Ok(()) => {
                let mut state = self.inner.lock().await;
                state.busy = false;
                self.record_status(&mut state, "State synchronized.");
                Ok(())
            }
            Err(err) => {
                Err(self
                    .fail_remote("sync_state", "Error syncing state", err)
                    .await)
            }
        }
    }

    /// Fetch the session account's snapshot for verbatim display.
    pub async fn refresh_account_info(&self) -> Result<serde_json::Value, SessionError> {
        let (client, account) = self
            .begin_action("refresh_account_info", |state| {
                state.account_id.clone().ok_or(SessionError::MissingAccount)
            })
            .await?;

        match client.account_snapshot(&account).await {
            Ok(info) => {
                let mut state = self.inner.lock().await;
                state.busy = false;
                state.account_info = Some(info.clone());
                self.record_status(&mut state, format!("Account info refreshed: {account}"));
                Ok(info)
            }
            Err(err) => {
                Err(self
                    .fail_remote("refresh_account_info", "Error fetching account info", err)
                    .await)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
