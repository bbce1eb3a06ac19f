use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{
    AccountId, FaucetId, KeyReference, NoteId, NoteVisibility, StorageMode, TransactionOutcome,
};
use thiserror::Error;

mod memory;
pub use memory::{InMemoryConnector, InMemoryLedger};

/// Contract required from an initialized connection to a ledger node.
///
/// Two ordering rules are load-bearing for callers: authentication material
/// for a key must be cached before a transaction is signed with it, and
/// local state must be resynchronized after a transaction is mined before
/// its created notes can be observed.
#[async_trait]
pub trait LedgerClient: Send + Sync + std::fmt::Debug {
    async fn create_wallet(&self, storage: StorageMode, mutable: bool) -> Result<AccountId>;

    async fn create_faucet(
        &self,
        storage: StorageMode,
        non_fungible: bool,
        symbol: &str,
        decimals: u8,
        max_supply: u64,
    ) -> Result<FaucetId>;

    /// Resynchronize the local view of chain state. Idempotent.
    async fn sync_state(&self) -> Result<()>;

    /// Fetch and cache the authentication material for a key.
    async fn cache_auth(&self, key: &KeyReference) -> Result<()>;

    async fn mint(
        &self,
        recipient: &AccountId,
        faucet: &FaucetId,
        visibility: NoteVisibility,
        amount: u64,
    ) -> Result<TransactionOutcome>;

    async fn consume(&self, owner: &AccountId, notes: &[NoteId]) -> Result<TransactionOutcome>;

    async fn send(
        &self,
        sender: &AccountId,
        recipient: &AccountId,
        faucet: &FaucetId,
        visibility: NoteVisibility,
        amount: u64,
    ) -> Result<TransactionOutcome>;

    /// Arbitrary structured snapshot of an account, surfaced to the user
    /// verbatim.
    async fn account_snapshot(&self, account: &AccountId) -> Result<serde_json::Value>;
}

/// Establishes [`LedgerClient`] handles from a node endpoint.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn LedgerClient>>;
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("unknown faucet {0}")]
    UnknownFaucet(FaucetId),
    #[error("authentication for {0} is not cached")]
    AuthNotCached(KeyReference),
    #[error("unknown note {0}")]
    UnknownNote(NoteId),
    #[error("note {0} is not committed yet")]
    NoteNotCommitted(NoteId),
    #[error("note {0} was already consumed")]
    NoteConsumed(NoteId),
    #[error("note {note} is not addressed to {owner}")]
    NoteNotAddressedTo { note: NoteId, owner: AccountId },
    #[error("minting {requested} would exceed max supply {max_supply} (already issued {issued})")]
    SupplyExceeded {
        requested: u64,
        issued: u64,
        max_supply: u64,
    },
    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: u64, requested: u64 },
    #[error("non-fungible faucets are not supported")]
    NonFungibleUnsupported,
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

#[derive(Debug)]
pub struct MissingLedgerClient;

#[async_trait]
impl LedgerClient for MissingLedgerClient {
    async fn create_wallet(&self, _storage: StorageMode, _mutable: bool) -> Result<AccountId> {
        Err(anyhow!("ledger backend is unavailable"))
    }

    async fn create_faucet(
        &self,
        _storage: StorageMode,
        _non_fungible: bool,
        symbol: &str,
        _decimals: u8,
        _max_supply: u64,
    ) -> Result<FaucetId> {
        Err(anyhow!("ledger backend is unavailable for faucet {symbol}"))
    }

    async fn sync_state(&self) -> Result<()> {
        Err(anyhow!("ledger backend is unavailable"))
    }

    async fn cache_auth(&self, key: &KeyReference) -> Result<()> {
        Err(anyhow!("ledger backend is unavailable for key {key}"))
    }

    async fn mint(
        &self,
        recipient: &AccountId,
        _faucet: &FaucetId,
        _visibility: NoteVisibility,
        _amount: u64,
    ) -> Result<TransactionOutcome> {
        Err(anyhow!(
            "ledger backend is unavailable for recipient {recipient}"
        ))
    }

    async fn consume(&self, owner: &AccountId, _notes: &[NoteId]) -> Result<TransactionOutcome> {
        Err(anyhow!("ledger backend is unavailable for owner {owner}"))
    }

    async fn send(
        &self,
        sender: &AccountId,
        _recipient: &AccountId,
        _faucet: &FaucetId,
        _visibility: NoteVisibility,
        _amount: u64,
    ) -> Result<TransactionOutcome> {
        Err(anyhow!("ledger backend is unavailable for sender {sender}"))
    }

    async fn account_snapshot(&self, account: &AccountId) -> Result<serde_json::Value> {
        Err(anyhow!(
            "ledger backend is unavailable for account {account}"
        ))
    }
}

pub struct MissingLedgerConnector;

#[async_trait]
impl LedgerConnector for MissingLedgerConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn LedgerClient>> {
        Err(anyhow!("no ledger connector configured for {endpoint}"))
    }
}
