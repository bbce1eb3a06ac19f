//! Session settings and the variant presets that replace the original
//! near-duplicate app copies.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use shared::domain::{AccountId, NoteVisibility};

const DEFAULT_SETTINGS_FILE: &str = "session.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenSettings {
    pub symbol: String,
    pub decimals: u8,
    pub max_supply: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TransferSettings {
    pub amount: u64,
    pub visibility: NoteVisibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CounterpartyEntry {
    pub id: AccountId,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionSettings {
    pub endpoint: String,
    pub token: TokenSettings,
    pub mint: TransferSettings,
    pub send: TransferSettings,
    pub counterparties: Vec<CounterpartyEntry>,
}

impl SessionSettings {
    /// Funding variant: public mints of a fungible demo token.
    pub fn funding() -> Self {
        Self {
            endpoint: "mem://local".to_string(),
            token: TokenSettings {
                symbol: "TOK".to_string(),
                decimals: 6,
                max_supply: 1_000_000,
            },
            mint: TransferSettings {
                amount: 10_000,
                visibility: NoteVisibility::Public,
            },
            send: TransferSettings {
                amount: 50,
                visibility: NoteVisibility::Private,
            },
            counterparties: vec![
                CounterpartyEntry {
                    id: AccountId::from("0xaddce0a4f2a74682"),
                    label: "Recipient 1".to_string(),
                },
                CounterpartyEntry {
                    id: AccountId::from("0x5f6d8a2b9c41e073"),
                    label: "Recipient 2".to_string(),
                },
            ],
        }
    }

    /// Voting variant: one private ballot note per mint, candidate-labelled
    /// counterparties.
    pub fn voting() -> Self {
        Self {
            endpoint: "mem://local".to_string(),
            token: TokenSettings {
                symbol: "VOTE".to_string(),
                decimals: 0,
                max_supply: 1_000_000,
            },
            mint: TransferSettings {
                amount: 1,
                visibility: NoteVisibility::Private,
            },
            send: TransferSettings {
                amount: 1,
                visibility: NoteVisibility::Private,
            },
            counterparties: vec![
                CounterpartyEntry {
                    id: AccountId::from("0xaddce0a4f2a74682"),
                    label: "Candidate 1".to_string(),
                },
                CounterpartyEntry {
                    id: AccountId::from("0xb3f1d27c8e905a44"),
                    label: "Candidate 2".to_string(),
                },
            ],
        }
    }

    pub fn counterparty(&self, id: &AccountId) -> Option<&CounterpartyEntry> {
        self.counterparties.iter().find(|entry| entry.id == *id)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::funding()
    }
}

/// Per-section overlay parsed from a settings file; absent sections keep the
/// base values.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    endpoint: Option<String>,
    token: Option<TokenSettings>,
    mint: Option<TransferSettings>,
    send: Option<TransferSettings>,
    counterparties: Option<Vec<CounterpartyEntry>>,
}

/// Layer a settings file and environment overrides over `base`.
///
/// An explicit `path` must be readable; the default `session.toml` is
/// optional.
pub fn load_settings(base: SessionSettings, path: Option<&Path>) -> anyhow::Result<SessionSettings> {
    let mut settings = base;

    let raw = match path {
        Some(path) => Some(fs::read_to_string(path).with_context(|| {
            format!("failed to read settings file '{}'", path.display())
        })?),
        None => fs::read_to_string(DEFAULT_SETTINGS_FILE).ok(),
    };
    if let Some(raw) = raw {
        let file: SettingsFile = toml::from_str(&raw).context("failed to parse settings file")?;
        if let Some(v) = file.endpoint {
            settings.endpoint = v;
        }
        if let Some(v) = file.token {
            settings.token = v;
        }
        if let Some(v) = file.mint {
            settings.mint = v;
        }
        if let Some(v) = file.send {
            settings.send = v;
        }
        if let Some(v) = file.counterparties {
            settings.counterparties = v;
        }
    }

    if let Ok(v) = std::env::var("SESSION_ENDPOINT") {
        settings.endpoint = v;
    }
    if let Ok(v) = std::env::var("APP__ENDPOINT") {
        settings.endpoint = v;
    }
    if let Ok(v) = std::env::var("APP__TOKEN_SYMBOL") {
        settings.token.symbol = v;
    }
    if let Ok(v) = std::env::var("APP__MINT_AMOUNT") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.mint.amount = parsed;
        }
    }

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
