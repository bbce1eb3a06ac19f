use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use ledger::InMemoryConnector;
use session_core::{config, SessionOrchestrator, SessionSettings};
use shared::domain::AccountId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(about = "Interactive session driver for the zkfund demo workflow")]
struct Args {
    /// Ledger node endpoint, overriding the configured one.
    #[arg(long)]
    endpoint: Option<String>,
    /// Settings file; defaults to ./session.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Workflow variant to load as the settings base.
    #[arg(long, value_enum, default_value_t = Variant::Funding)]
    variant: Variant,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Variant {
    Funding,
    Voting,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let base = match args.variant {
        Variant::Funding => SessionSettings::funding(),
        Variant::Voting => SessionSettings::voting(),
    };
    let mut settings = config::load_settings(base, args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        settings.endpoint = endpoint;
    }

    let endpoint = settings.endpoint.clone();
    let orchestrator = SessionOrchestrator::new(settings, Arc::new(InMemoryConnector::new()));

    // Like the original app, connect as soon as the session starts.
    if let Err(err) = orchestrator.initialize(&endpoint).await {
        warn!(error = %err, "initial connect failed; retry with 'init'");
    }
    print_status(&orchestrator).await;
    print_counterparties(&orchestrator);
    println!("Type 'help' for the command list.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let argument = parts.next();
        if !run_command(&orchestrator, &endpoint, command, argument).await {
            break;
        }
        prompt()?;
    }

    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

/// Dispatch one console command; returns false to leave the loop.
async fn run_command(
    orchestrator: &SessionOrchestrator,
    endpoint: &str,
    command: &str,
    argument: Option<&str>,
) -> bool {
    match command {
        "" => return true,
        "quit" | "exit" => return false,
        "help" => {
            print_help();
            return true;
        }
        "init" => {
            report(orchestrator.initialize(endpoint).await);
        }
        "account" => {
            report(orchestrator.create_account().await);
        }
        "faucet" => {
            report(orchestrator.create_faucet().await);
        }
        "select" => {
            let Some(argument) = argument else {
                println!("usage: select <index|id>");
                return true;
            };
            match resolve_counterparty(orchestrator, argument) {
                Some(id) => {
                    report(orchestrator.select_counterparty(&id).await);
                }
                None => {
                    println!("no counterparty at index {argument}");
                    return true;
                }
            }
        }
        "mint" => {
            report(orchestrator.mint_tokens().await);
        }
        "notes" => {
            report(orchestrator.fetch_notes().await);
        }
        "consume" => {
            report(orchestrator.consume_notes().await);
        }
        "send" => {
            let Some(argument) = argument else {
                println!("usage: send <recipient-id>");
                return true;
            };
            report(orchestrator.send_tokens(&AccountId::from(argument)).await);
        }
        "sync" => {
            report(orchestrator.sync_state().await);
        }
        "info" => {
            if report(orchestrator.refresh_account_info().await) {
                if let Some(info) = orchestrator.snapshot().await.account_info {
                    match serde_json::to_string_pretty(&info) {
                        Ok(rendered) => println!("{rendered}"),
                        Err(err) => println!("error: {err}"),
                    }
                }
            }
        }
        "state" => {
            let snapshot = orchestrator.snapshot().await;
            match serde_json::to_string_pretty(&snapshot) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => println!("error: {err}"),
            }
            return true;
        }
        other => {
            println!("unknown command '{other}' (try 'help')");
            return true;
        }
    }
    print_status(orchestrator).await;
    true
}

/// A 1-based index picks from the configured set; anything else is taken as
/// a raw id (the orchestrator still validates membership).
fn resolve_counterparty(orchestrator: &SessionOrchestrator, argument: &str) -> Option<AccountId> {
    match argument.parse::<usize>() {
        Ok(index) if index >= 1 => orchestrator
            .settings()
            .counterparties
            .get(index - 1)
            .map(|entry| entry.id.clone()),
        _ => Some(AccountId::from(argument)),
    }
}

fn report<T>(result: Result<T, session_core::SessionError>) -> bool {
    match result {
        Ok(_) => true,
        Err(err) => {
            println!("error: {err}");
            false
        }
    }
}

async fn print_status(orchestrator: &SessionOrchestrator) {
    if let Some(line) = orchestrator.snapshot().await.status {
        println!("[{}] {}", line.at.format("%H:%M:%S"), line.message);
    }
}

fn print_counterparties(orchestrator: &SessionOrchestrator) {
    println!("Counterparties:");
    for (index, entry) in orchestrator.settings().counterparties.iter().enumerate() {
        println!("  {}. {} ({})", index + 1, entry.label, entry.id);
    }
}

fn print_help() {
    println!("commands:");
    println!("  init             connect to the configured endpoint");
    println!("  account          create the session wallet account");
    println!("  faucet           create the token faucet");
    println!("  select <n|id>    choose a counterparty");
    println!("  mint             mint tokens to the selected counterparty");
    println!("  notes            fetch the minted notes");
    println!("  consume          consume the fetched notes");
    println!("  send <id>        send tokens from the session account");
    println!("  sync             resynchronize chain state");
    println!("  info             fetch and print the account snapshot");
    println!("  state            print the full session snapshot");
    println!("  quit             leave");
}
