//! In-process ledger backend for development and demos.
//!
//! Honors the contract's ordering rules: transactions require previously
//! cached authentication for the signing key, and notes created by a
//! transaction stay pending until the next `sync_state` commits them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use shared::domain::{
    AccountId, FaucetId, KeyReference, NoteId, NoteVisibility, StorageMode, TransactionId,
    TransactionOutcome,
};
use tokio::sync::Mutex;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::{LedgerClient, LedgerConnector, LedgerError};

#[derive(Debug)]
struct WalletRecord {
    storage: StorageMode,
    mutable: bool,
}

#[derive(Debug)]
struct FaucetRecord {
    symbol: String,
    decimals: u8,
    max_supply: u64,
    issued: u64,
}

#[derive(Debug)]
struct NoteRecord {
    faucet: FaucetId,
    recipient: AccountId,
    amount: u64,
    visibility: NoteVisibility,
    committed: bool,
    consumed: bool,
}

#[derive(Default, Debug)]
struct LedgerState {
    accounts: HashMap<AccountId, WalletRecord>,
    faucets: HashMap<FaucetId, FaucetRecord>,
    notes: HashMap<NoteId, NoteRecord>,
    balances: HashMap<(AccountId, FaucetId), u64>,
    cached_auth: HashSet<KeyReference>,
    block_height: u64,
    next_account: u64,
    next_faucet: u64,
    next_note: u64,
}

#[derive(Debug)]
pub struct InMemoryLedger {
    inner: Mutex<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerState::default()),
        }
    }

    /// Committed balance of `account` for `faucet`.
    pub async fn balance(&self, account: &AccountId, faucet: &FaucetId) -> u64 {
        let state = self.inner.lock().await;
        state
            .balances
            .get(&(account.clone(), faucet.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Visibility a note was created with, if the note exists.
    pub async fn note_visibility(&self, note: &NoteId) -> Option<NoteVisibility> {
        let state = self.inner.lock().await;
        state.notes.get(note).map(|record| record.visibility)
    }
}

fn new_transaction_id() -> TransactionId {
    TransactionId::new(format!("tx-{}", Uuid::new_v4()))
}

fn balances_json(state: &LedgerState, account: &AccountId) -> Vec<serde_json::Value> {
    let mut entries: Vec<_> = state
        .balances
        .iter()
        .filter(|((owner, _), _)| owner == account)
        .map(|((_, faucet), amount)| {
            let faucet_record = state.faucets.get(faucet);
            json!({
                "faucet": faucet,
                "symbol": faucet_record.map(|record| record.symbol.clone()),
                "decimals": faucet_record.map(|record| record.decimals),
                "amount": amount,
            })
        })
        .collect();
    entries.sort_by_key(|entry| entry["faucet"].to_string());
    entries
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn create_wallet(&self, storage: StorageMode, mutable: bool) -> Result<AccountId> {
        let mut state = self.inner.lock().await;
        state.next_account += 1;
        let id = AccountId::new(format!("acct-{}", state.next_account));
        state
            .accounts
            .insert(id.clone(), WalletRecord { storage, mutable });
        info!(account = %id, ?storage, mutable, "ledger: wallet created");
        Ok(id)
    }

    async fn create_faucet(
        &self,
        storage: StorageMode,
        non_fungible: bool,
        symbol: &str,
        decimals: u8,
        max_supply: u64,
    ) -> Result<FaucetId> {
        if non_fungible {
            return Err(LedgerError::NonFungibleUnsupported.into());
        }
        let mut state = self.inner.lock().await;
        state.next_faucet += 1;
        let id = FaucetId::new(format!("faucet-{}", state.next_faucet));
        state.faucets.insert(
            id.clone(),
            FaucetRecord {
                symbol: symbol.to_string(),
                decimals,
                max_supply,
                issued: 0,
            },
        );
        info!(faucet = %id, ?storage, symbol, decimals, max_supply, "ledger: faucet created");
        Ok(id)
    }

    async fn sync_state(&self) -> Result<()> {
        let mut state = self.inner.lock().await;
        let mut committed = 0;
        for note in state.notes.values_mut().filter(|note| !note.committed) {
            note.committed = true;
            committed += 1;
        }
        state.block_height += 1;
        info!(
            block_height = state.block_height,
            committed_notes = committed,
            "ledger: state synchronized"
        );
        Ok(())
    }

    async fn cache_auth(&self, key: &KeyReference) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.cached_auth.insert(key.clone());
        info!(key = %key, "ledger: auth cached");
        Ok(())
    }

    async fn mint(
        &self,
        recipient: &AccountId,
        faucet: &FaucetId,
        visibility: NoteVisibility,
        amount: u64,
    ) -> Result<TransactionOutcome> {
        let mut state = self.inner.lock().await;
        let key = KeyReference::Faucet(faucet.clone());
        if !state.cached_auth.contains(&key) {
            return Err(LedgerError::AuthNotCached(key).into());
        }
        let record = state
            .faucets
            .get_mut(faucet)
            .ok_or_else(|| LedgerError::UnknownFaucet(faucet.clone()))?;
        if record.issued + amount > record.max_supply {
            return Err(LedgerError::SupplyExceeded {
                requested: amount,
                issued: record.issued,
                max_supply: record.max_supply,
            }
            .into());
        }
        record.issued += amount;
        state.next_note += 1;
        let note_id = NoteId::new(format!("note-{}", state.next_note));
        state.notes.insert(
            note_id.clone(),
            NoteRecord {
                faucet: faucet.clone(),
                recipient: recipient.clone(),
                amount,
                visibility,
                committed: false,
                consumed: false,
            },
        );
        info!(
            recipient = %recipient,
            faucet = %faucet,
            amount,
            ?visibility,
            note = %note_id,
            "ledger: mint submitted"
        );
        Ok(TransactionOutcome {
            transaction_id: new_transaction_id(),
            created_notes: vec![note_id],
        })
    }

    async fn consume(&self, owner: &AccountId, notes: &[NoteId]) -> Result<TransactionOutcome> {
        let mut state = self.inner.lock().await;
        let key = KeyReference::Account(owner.clone());
        if !state.cached_auth.contains(&key) {
            return Err(LedgerError::AuthNotCached(key).into());
        }
        // Validate the whole set before touching any note.
        for note_id in notes {
            let note = state
                .notes
                .get(note_id)
                .ok_or_else(|| LedgerError::UnknownNote(note_id.clone()))?;
            if !note.committed {
                return Err(LedgerError::NoteNotCommitted(note_id.clone()).into());
            }
            if note.consumed {
                return Err(LedgerError::NoteConsumed(note_id.clone()).into());
            }
            if note.recipient != *owner {
                return Err(LedgerError::NoteNotAddressedTo {
                    note: note_id.clone(),
                    owner: owner.clone(),
                }
                .into());
            }
        }
        for note_id in notes {
            let Some(note) = state.notes.get_mut(note_id) else {
                continue;
            };
            note.consumed = true;
            let credit = (note.faucet.clone(), note.amount);
            *state
                .balances
                .entry((owner.clone(), credit.0))
                .or_default() += credit.1;
        }
        info!(owner = %owner, notes = notes.len(), "ledger: notes consumed");
        Ok(TransactionOutcome {
            transaction_id: new_transaction_id(),
            created_notes: Vec::new(),
        })
    }

    async fn send(
        &self,
        sender: &AccountId,
        recipient: &AccountId,
        faucet: &FaucetId,
        visibility: NoteVisibility,
        amount: u64,
    ) -> Result<TransactionOutcome> {
        let mut state = self.inner.lock().await;
        let key = KeyReference::Account(sender.clone());
        if !state.cached_auth.contains(&key) {
            return Err(LedgerError::AuthNotCached(key).into());
        }
        if !state.faucets.contains_key(faucet) {
            return Err(LedgerError::UnknownFaucet(faucet.clone()).into());
        }
        let balance = state
            .balances
            .entry((sender.clone(), faucet.clone()))
            .or_default();
        if *balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: *balance,
                requested: amount,
            }
            .into());
        }
        *balance -= amount;
        state.next_note += 1;
        let note_id = NoteId::new(format!("note-{}", state.next_note));
        state.notes.insert(
            note_id.clone(),
            NoteRecord {
                faucet: faucet.clone(),
                recipient: recipient.clone(),
                amount,
                visibility,
                committed: false,
                consumed: false,
            },
        );
        info!(
            sender = %sender,
            recipient = %recipient,
            faucet = %faucet,
            amount,
            note = %note_id,
            "ledger: send submitted"
        );
        Ok(TransactionOutcome {
            transaction_id: new_transaction_id(),
            created_notes: vec![note_id],
        })
    }

    async fn account_snapshot(&self, account: &AccountId) -> Result<serde_json::Value> {
        let state = self.inner.lock().await;
        let balances = balances_json(&state, account);
        if let Some(record) = state.accounts.get(account) {
            return Ok(json!({
                "id": account,
                "kind": "wallet",
                "storage_mode": record.storage,
                "mutable": record.mutable,
                "balances": balances,
            }));
        }
        if !balances.is_empty() {
            return Ok(json!({
                "id": account,
                "kind": "external",
                "balances": balances,
            }));
        }
        Err(LedgerError::UnknownAccount(account.clone()).into())
    }
}

/// Connects `mem://` / `test://` endpoints to an in-memory ledger.
pub struct InMemoryConnector {
    shared: Option<Arc<InMemoryLedger>>,
}

impl Default for InMemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnector {
    /// Every connect yields a fresh, isolated ledger.
    pub fn new() -> Self {
        Self { shared: None }
    }

    /// Every connect yields the same ledger instance.
    pub fn with_shared(ledger: Arc<InMemoryLedger>) -> Self {
        Self {
            shared: Some(ledger),
        }
    }
}

#[async_trait]
impl LedgerConnector for InMemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn LedgerClient>> {
        let url = Url::parse(endpoint).map_err(LedgerError::InvalidEndpoint)?;
        match url.scheme() {
            "mem" | "test" => {}
            other => return Err(LedgerError::UnsupportedScheme(other.to_string()).into()),
        }
        info!(endpoint, "ledger: connected in-memory backend");
        match &self.shared {
            Some(ledger) => Ok(Arc::clone(ledger) as Arc<dyn LedgerClient>),
            None => Ok(Arc::new(InMemoryLedger::new())),
        }
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
