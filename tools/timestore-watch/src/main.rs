//! Terminal front end for the TimeStore contract.
//!
//! Connects to the compiled-in provider, polls for unlocked messages and
//! prints them. Commands on stdin:
//!
//! - `store <YYYY-MM-DD HH:MM> <text>` submits a message unlocking at that
//!   local time
//! - `refresh` fetches immediately

use anyhow::{bail, Context};
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use timestore_client::rpc::JsonRpcProvider;
use timestore_client::{
    ContractClient, MessageBoard, PollScheduler, PollStatus, Provider, Session, WalletConnector,
};
use timestore_common::config::ClientConfig;
use timestore_common::interface::InterfaceDescriptor;
use timestore_common::message::{StoredMessage, SubmissionRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const UNLOCK_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

enum Command {
    Store(SubmissionRequest),
    Refresh,
}

fn parse_command(line: &str) -> anyhow::Result<Command> {
    let line = line.trim();
    if line == "refresh" {
        return Ok(Command::Refresh);
    }
    let Some(rest) = line.strip_prefix("store ") else {
        bail!("unknown command, expected `store <YYYY-MM-DD HH:MM> <text>` or `refresh`");
    };
    let mut parts = rest.trim_start().splitn(3, ' ');
    let (Some(date), Some(time), Some(text)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("usage: store <YYYY-MM-DD HH:MM> <text>");
    };
    let naive = NaiveDateTime::parse_from_str(&format!("{date} {time}"), UNLOCK_INPUT_FORMAT)
        .with_context(|| format!("bad unlock time `{date} {time}`"))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .context("unlock time does not exist in the local timezone")?;
    Ok(Command::Store(SubmissionRequest::at(text, local.with_timezone(&Utc))?))
}

fn print_messages(board: &MessageBoard) {
    let state = board.snapshot();
    println!("--- {} unlocked message(s) ---", state.messages.len());
    for m in &state.messages {
        print_row(m);
    }
}

fn print_row(m: &StoredMessage) {
    println!("{:>4}  {:<16}  {}", m.id, m.unlock_label(&Local), m.text);
}

async fn run_command<P: Provider>(
    client: &ContractClient<P>,
    board: &MessageBoard,
    command: Command,
) {
    match command {
        Command::Store(request) => match client.submit(request).await {
            Ok(tx) => println!("submitted in transaction {tx}"),
            Err(e) => {
                println!("submission failed: {e}");
                board.report_error(e);
            }
        },
        Command::Refresh => match client.fetch_unlocked().await {
            Ok(messages) => {
                board.apply(messages);
                print_messages(board);
            }
            Err(e) => {
                println!("refresh failed: {e}");
                board.report_error(e);
            }
        },
    }
}

/// Whether `status` reports a tick that has not been shown yet. Skipped
/// ticks change the status without completing one.
fn take_new_tick(shown_ticks: &mut u64, status: &PollStatus) -> bool {
    if status.ticks == *shown_ticks {
        return false;
    }
    *shown_ticks = status.ticks;
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::compiled().context("invalid compiled-in contract address")?;
    info!(provider = %config.provider_url, contract = %config.contract_address, "starting");

    let board = MessageBoard::new();
    let session = Session::establish(
        WalletConnector::new(JsonRpcProvider::new(config.provider_url.clone())),
        config.contract_address,
        InterfaceDescriptor::time_store(),
    )
    .await;
    board.set_connection(session.state());

    let client = match &session {
        Session::Connected(client) => client.clone(),
        Session::Unavailable(e) => {
            println!("An Ethereum wallet/provider is required to use this client.");
            bail!("wallet unavailable at {}: {e}", config.provider_url);
        }
    };
    println!("connected as {} on chain {}", client.account(), client.chain_id());

    let tick_board = board.clone();
    let mut poller = PollScheduler::start(client.clone(), config.refresh_minutes, move |msgs| {
        tick_board.apply(msgs);
        print_messages(&tick_board);
    })?;
    let mut status = poller.subscribe();
    let mut shown_ticks = 0;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => run_command(&client, &board, command).await,
                    Err(e) => println!("{e:#}"),
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    warn!("poll scheduler ended");
                    break;
                }
                let s = status.borrow_and_update().clone();
                if !take_new_tick(&mut shown_ticks, &s) {
                    continue;
                }
                if let Some(e) = &s.last_error {
                    println!("refresh failed: {e}");
                    board.report_error(e);
                }
                println!("next refresh at {}", s.schedule.next_refresh_label());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    PollScheduler::stop(&mut poller);
    Ok(())
}
