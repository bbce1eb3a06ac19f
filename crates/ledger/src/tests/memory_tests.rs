use super::*;
use crate::LedgerError;

async fn ledger_with_faucet() -> (InMemoryLedger, AccountId, FaucetId) {
    let ledger = InMemoryLedger::new();
    let account = ledger
        .create_wallet(StorageMode::OffChain, true)
        .await
        .expect("wallet");
    let faucet = ledger
        .create_faucet(StorageMode::OffChain, false, "TOK", 6, 1_000_000)
        .await
        .expect("faucet");
    (ledger, account, faucet)
}

#[tokio::test]
async fn connector_accepts_mem_and_test_schemes_only() {
    let connector = InMemoryConnector::new();
    connector.connect("mem://local").await.expect("mem scheme");
    connector.connect("test://node").await.expect("test scheme");

    let err = connector
        .connect("https://node.example:57291")
        .await
        .expect_err("https must be refused");
    match err.downcast_ref::<LedgerError>() {
        Some(LedgerError::UnsupportedScheme(scheme)) => assert_eq!(scheme, "https"),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = connector
        .connect("not a url")
        .await
        .expect_err("garbage must be refused");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::InvalidEndpoint(_))
    ));
}

#[tokio::test]
async fn shared_connector_hands_out_the_same_ledger() {
    let ledger = Arc::new(InMemoryLedger::new());
    let connector = InMemoryConnector::with_shared(Arc::clone(&ledger));

    let handle = connector.connect("mem://local").await.expect("connect");
    let account = handle
        .create_wallet(StorageMode::OffChain, true)
        .await
        .expect("wallet");

    // Visible through the original instance.
    let snapshot = ledger.account_snapshot(&account).await.expect("snapshot");
    assert_eq!(snapshot["kind"], "wallet");
}

#[tokio::test]
async fn create_faucet_rejects_non_fungible() {
    let ledger = InMemoryLedger::new();
    let err = ledger
        .create_faucet(StorageMode::OffChain, true, "NFT", 0, 1)
        .await
        .expect_err("non-fungible unsupported");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::NonFungibleUnsupported)
    ));
}

#[tokio::test]
async fn mint_requires_cached_faucet_auth() {
    let (ledger, account, faucet) = ledger_with_faucet().await;

    let err = ledger
        .mint(&account, &faucet, NoteVisibility::Public, 10)
        .await
        .expect_err("auth not cached yet");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::AuthNotCached(KeyReference::Faucet(_)))
    ));

    ledger
        .cache_auth(&KeyReference::Faucet(faucet.clone()))
        .await
        .expect("cache auth");
    let outcome = ledger
        .mint(&account, &faucet, NoteVisibility::Public, 10)
        .await
        .expect("mint after caching");
    assert_eq!(outcome.created_notes.len(), 1);
    assert_eq!(
        ledger.note_visibility(&outcome.created_notes[0]).await,
        Some(NoteVisibility::Public)
    );
}

#[tokio::test]
async fn mint_enforces_max_supply() {
    let ledger = InMemoryLedger::new();
    let account = ledger
        .create_wallet(StorageMode::OffChain, true)
        .await
        .expect("wallet");
    let faucet = ledger
        .create_faucet(StorageMode::OffChain, false, "TOK", 6, 100)
        .await
        .expect("faucet");
    ledger
        .cache_auth(&KeyReference::Faucet(faucet.clone()))
        .await
        .expect("cache auth");

    ledger
        .mint(&account, &faucet, NoteVisibility::Public, 70)
        .await
        .expect("first mint within supply");
    let err = ledger
        .mint(&account, &faucet, NoteVisibility::Public, 40)
        .await
        .expect_err("supply exceeded");
    match err.downcast_ref::<LedgerError>() {
        Some(LedgerError::SupplyExceeded {
            requested,
            issued,
            max_supply,
        }) => {
            assert_eq!((*requested, *issued, *max_supply), (40, 70, 100));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn minted_notes_become_consumable_only_after_sync() {
    let (ledger, account, faucet) = ledger_with_faucet().await;
    ledger
        .cache_auth(&KeyReference::Faucet(faucet.clone()))
        .await
        .expect("faucet auth");
    ledger
        .cache_auth(&KeyReference::Account(account.clone()))
        .await
        .expect("account auth");

    let outcome = ledger
        .mint(&account, &faucet, NoteVisibility::Private, 25)
        .await
        .expect("mint");
    let notes = outcome.created_notes;

    let err = ledger
        .consume(&account, &notes)
        .await
        .expect_err("note still pending");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::NoteNotCommitted(_))
    ));

    ledger.sync_state().await.expect("sync");
    ledger
        .consume(&account, &notes)
        .await
        .expect("consume after sync");
    assert_eq!(ledger.balance(&account, &faucet).await, 25);

    let err = ledger
        .consume(&account, &notes)
        .await
        .expect_err("double consume");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::NoteConsumed(_))
    ));
}

#[tokio::test]
async fn consume_requires_owner_auth_and_addressing() {
    let (ledger, account, faucet) = ledger_with_faucet().await;
    ledger
        .cache_auth(&KeyReference::Faucet(faucet.clone()))
        .await
        .expect("faucet auth");
    let recipient = AccountId::from("0xaddce0a4f2a74682");
    let outcome = ledger
        .mint(&recipient, &faucet, NoteVisibility::Public, 10)
        .await
        .expect("mint to external recipient");
    ledger.sync_state().await.expect("sync");

    let err = ledger
        .consume(&recipient, &outcome.created_notes)
        .await
        .expect_err("owner auth not cached");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::AuthNotCached(KeyReference::Account(_)))
    ));

    // A different owner with cached auth still cannot take the note.
    ledger
        .cache_auth(&KeyReference::Account(account.clone()))
        .await
        .expect("account auth");
    let err = ledger
        .consume(&account, &outcome.created_notes)
        .await
        .expect_err("note addressed elsewhere");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::NoteNotAddressedTo { .. })
    ));

    ledger
        .cache_auth(&KeyReference::Account(recipient.clone()))
        .await
        .expect("recipient auth");
    ledger
        .consume(&recipient, &outcome.created_notes)
        .await
        .expect("rightful owner consumes");
    assert_eq!(ledger.balance(&recipient, &faucet).await, 10);
}

#[tokio::test]
async fn send_debits_sender_and_creates_pending_note() {
    let (ledger, account, faucet) = ledger_with_faucet().await;
    ledger
        .cache_auth(&KeyReference::Faucet(faucet.clone()))
        .await
        .expect("faucet auth");
    ledger
        .cache_auth(&KeyReference::Account(account.clone()))
        .await
        .expect("account auth");

    // Fund the sender first.
    let minted = ledger
        .mint(&account, &faucet, NoteVisibility::Public, 100)
        .await
        .expect("mint");
    ledger.sync_state().await.expect("sync");
    ledger
        .consume(&account, &minted.created_notes)
        .await
        .expect("fund sender");

    let recipient = AccountId::from("acct-receiver");
    let err = ledger
        .send(&account, &recipient, &faucet, NoteVisibility::Private, 500)
        .await
        .expect_err("more than balance");
    match err.downcast_ref::<LedgerError>() {
        Some(LedgerError::InsufficientBalance {
            available,
            requested,
        }) => assert_eq!((*available, *requested), (100, 500)),
        other => panic!("unexpected error: {other:?}"),
    }

    let outcome = ledger
        .send(&account, &recipient, &faucet, NoteVisibility::Private, 50)
        .await
        .expect("send");
    assert_eq!(ledger.balance(&account, &faucet).await, 50);
    assert_eq!(outcome.created_notes.len(), 1);

    // The transfer note follows the same commit rule as minted notes.
    ledger
        .cache_auth(&KeyReference::Account(recipient.clone()))
        .await
        .expect("recipient auth");
    let err = ledger
        .consume(&recipient, &outcome.created_notes)
        .await
        .expect_err("pending until sync");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::NoteNotCommitted(_))
    ));
    ledger.sync_state().await.expect("sync");
    ledger
        .consume(&recipient, &outcome.created_notes)
        .await
        .expect("consume transfer note");
    assert_eq!(ledger.balance(&recipient, &faucet).await, 50);
}

#[tokio::test]
async fn account_snapshot_reports_wallet_and_external_accounts() {
    let (ledger, account, faucet) = ledger_with_faucet().await;

    let snapshot = ledger.account_snapshot(&account).await.expect("wallet");
    assert_eq!(snapshot["kind"], "wallet");
    assert_eq!(snapshot["storage_mode"], "off_chain");
    assert_eq!(snapshot["mutable"], true);

    let unknown = AccountId::from("acct-nowhere");
    let err = ledger
        .account_snapshot(&unknown)
        .await
        .expect_err("unknown account");
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::UnknownAccount(_))
    ));

    // An external id becomes visible once it holds a balance.
    let external = AccountId::from("0xaddce0a4f2a74682");
    ledger
        .cache_auth(&KeyReference::Faucet(faucet.clone()))
        .await
        .expect("faucet auth");
    ledger
        .cache_auth(&KeyReference::Account(external.clone()))
        .await
        .expect("external auth");
    let outcome = ledger
        .mint(&external, &faucet, NoteVisibility::Public, 5)
        .await
        .expect("mint");
    ledger.sync_state().await.expect("sync");
    ledger
        .consume(&external, &outcome.created_notes)
        .await
        .expect("consume");

    let snapshot = ledger.account_snapshot(&external).await.expect("external");
    assert_eq!(snapshot["kind"], "external");
    assert_eq!(snapshot["balances"][0]["symbol"], "TOK");
    assert_eq!(snapshot["balances"][0]["amount"], 5);
}
