use std::sync::Arc;

use ledger::{InMemoryConnector, InMemoryLedger};
use session_core::{SessionError, SessionOrchestrator, SessionSettings, SessionStage};

#[tokio::test]
async fn full_workflow_over_the_in_memory_backend() {
    let ledger = Arc::new(InMemoryLedger::new());
    let connector = Arc::new(InMemoryConnector::with_shared(Arc::clone(&ledger)));
    let settings = SessionSettings::funding();
    let counterparty = settings.counterparties[0].id.clone();
    let orchestrator = SessionOrchestrator::new(settings.clone(), connector);

    orchestrator.initialize("mem://local").await.expect("init");
    let account = orchestrator.create_account().await.expect("account");
    let faucet = orchestrator.create_faucet().await.expect("faucet");
    orchestrator
        .select_counterparty(&counterparty)
        .await
        .expect("select");

    let minted = orchestrator.mint_tokens().await.expect("mint");
    assert_eq!(minted.len(), 1);
    let fetched = orchestrator.fetch_notes().await.expect("fetch");
    assert_eq!(fetched, minted);
    orchestrator.consume_notes().await.expect("consume");

    assert_eq!(
        ledger.balance(&counterparty, &faucet).await,
        settings.mint.amount
    );
    assert_eq!(orchestrator.snapshot().await.stage, SessionStage::Consumed);

    // The session wallet holds nothing, so the backend refuses a send.
    let err = orchestrator
        .send_tokens(&counterparty)
        .await
        .expect_err("unfunded sender");
    assert!(matches!(err, SessionError::Ledger(_)));
    let status = orchestrator
        .snapshot()
        .await
        .status
        .expect("status line")
        .message;
    assert!(
        status.starts_with("Error sending tokens:"),
        "status: {status}"
    );

    // Account info surfaces the backend snapshot verbatim.
    let info = orchestrator.refresh_account_info().await.expect("info");
    assert_eq!(info["id"], account.as_str());
    assert_eq!(info["kind"], "wallet");

    // Repeated syncs are harmless.
    orchestrator.sync_state().await.expect("sync");
    orchestrator.sync_state().await.expect("sync again");
}

#[tokio::test]
async fn voting_variant_casts_a_ballot_for_the_selected_candidate() {
    let ledger = Arc::new(InMemoryLedger::new());
    let connector = Arc::new(InMemoryConnector::with_shared(Arc::clone(&ledger)));
    let settings = SessionSettings::voting();
    let candidate = settings.counterparties[1].id.clone();
    let orchestrator = SessionOrchestrator::new(settings, connector);

    orchestrator.initialize("mem://local").await.expect("init");
    orchestrator.create_account().await.expect("account");
    let faucet = orchestrator.create_faucet().await.expect("faucet");
    orchestrator
        .select_counterparty(&candidate)
        .await
        .expect("select");
    orchestrator.mint_tokens().await.expect("mint ballot");
    orchestrator.fetch_notes().await.expect("fetch ballot");
    orchestrator.consume_notes().await.expect("cast ballot");

    // One VOTE token lands with the chosen candidate.
    assert_eq!(ledger.balance(&candidate, &faucet).await, 1);
}
