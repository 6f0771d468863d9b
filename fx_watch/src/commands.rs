//! Line commands read from stdin while watching.
//!
//! Watchlist edits are mirrored onto the subscription manager so that
//! exactly the active entries are subscribed.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use fx_common::markets::forex::currency_name;
use fx_common::{AppPhase, CurrencyPair, SubscriptionManager, WatchlistStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const HELP: &str = "\
commands:
  list                      show the watchlist with live rates
  available                 pairs that can still be added
  add <PAIR> [PAIR...]      add one or more pairs (e.g. add USD/CHF EUR/JPY)
  remove <ID>               remove an entry
  toggle <ID>               activate or deactivate an entry
  reorder <ID> [ID...]      set the order; every id exactly once
  pause <PAIR> | resume <PAIR> | reconnect <PAIR>
  bg | fg                   simulate the app going to background / foreground
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Available,
    Add(Vec<String>),
    Remove(String),
    Toggle(String),
    Reorder(Vec<String>),
    Pause(String),
    Resume(String),
    Reconnect(String),
    Phase(AppPhase),
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<String> = words.map(str::to_string).collect();

    let one = |name: &str| -> Result<String> {
        match args.as_slice() {
            [single] => Ok(single.clone()),
            _ => Err(anyhow!("usage: {} <arg>", name)),
        }
    };
    let many = |name: &str| -> Result<Vec<String>> {
        if args.is_empty() {
            Err(anyhow!("usage: {} <arg> [arg...]", name))
        } else {
            Ok(args.clone())
        }
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" => ConsoleCommand::List,
        "available" => ConsoleCommand::Available,
        "add" => ConsoleCommand::Add(many("add")?),
        "remove" | "rm" => ConsoleCommand::Remove(one("remove")?),
        "toggle" => ConsoleCommand::Toggle(one("toggle")?),
        "reorder" => ConsoleCommand::Reorder(many("reorder")?),
        "pause" => ConsoleCommand::Pause(one("pause")?),
        "resume" => ConsoleCommand::Resume(one("resume")?),
        "reconnect" => ConsoleCommand::Reconnect(one("reconnect")?),
        "bg" | "background" => ConsoleCommand::Phase(AppPhase::Background),
        "fg" | "foreground" => ConsoleCommand::Phase(AppPhase::Active),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(anyhow!("unknown command `{}`, try `help`", other)),
    };
    Ok(Some(command))
}

pub enum Flow {
    Continue,
    Quit,
}

pub struct Console {
    store: Arc<WatchlistStore>,
    manager: SubscriptionManager,
    phases: watch::Sender<AppPhase>,
}

impl Console {
    pub fn new(store: Arc<WatchlistStore>, manager: SubscriptionManager, phases: watch::Sender<AppPhase>) -> Self {
        Self { store, manager, phases }
    }

    /// Reads stdin until `quit`, end of input or `shutdown`.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("stdin closed");
                break;
            };

            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(command)) => match self.execute(command).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => println!("error: {}", e),
                },
                Err(e) => println!("{}", e),
            }
        }
        Ok(())
    }

    pub async fn execute(&self, command: ConsoleCommand) -> Result<Flow> {
        match command {
            ConsoleCommand::List => self.print_list().await,
            ConsoleCommand::Available => {
                let available = self.store.get_available_to_add().await;
                if available.is_empty() {
                    println!("every supported pair is already on the watchlist");
                }
                for pair in available {
                    println!("{:<8} {} / {}", pair, currency_name(pair.base()), currency_name(pair.quote()));
                }
            }
            ConsoleCommand::Add(pairs) => {
                let added = if pairs.len() == 1 {
                    vec![self.store.add_pair(&pairs[0]).await?]
                } else {
                    self.store.add_multiple_pairs(&pairs).await?
                };
                for entry in &added {
                    self.manager.subscribe(&entry.pair);
                    println!("added {} ({})", entry.pair_string, entry.id);
                }
                if added.is_empty() {
                    println!("nothing to add");
                }
            }
            ConsoleCommand::Remove(id) => {
                let entry = self.store.entries().await.into_iter().find(|e| e.id == id);
                if self.store.remove_pair(&id).await? {
                    if let Some(entry) = entry.filter(|e| e.is_active) {
                        self.manager.unsubscribe(&entry.pair);
                    }
                    println!("removed {}", id);
                } else {
                    println!("no entry {}", id);
                }
            }
            ConsoleCommand::Toggle(id) => match self.store.toggle_pair_active(&id).await? {
                Some(is_active) => {
                    let entry = self.store.entries().await.into_iter().find(|e| e.id == id);
                    if let Some(entry) = entry {
                        if is_active {
                            self.manager.subscribe(&entry.pair);
                        } else {
                            self.manager.unsubscribe(&entry.pair);
                        }
                        println!("{} is now {}", entry.pair_string, if is_active { "active" } else { "inactive" });
                    }
                }
                None => println!("no entry {}", id),
            },
            ConsoleCommand::Reorder(ids) => {
                self.store.reorder_pairs(ids.as_slice()).await?;
                self.print_list().await;
            }
            ConsoleCommand::Pause(pair) => self.manager.pause(&parse_pair(&pair)?),
            ConsoleCommand::Resume(pair) => self.manager.resume(&parse_pair(&pair)?),
            ConsoleCommand::Reconnect(pair) => self.manager.reconnect(&parse_pair(&pair)?),
            ConsoleCommand::Phase(phase) => {
                info!(?phase, "Phase change requested from console");
                self.phases.send_replace(phase);
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn print_list(&self) {
        for entry in self.store.entries().await {
            let view = self.manager.snapshot(&entry.pair);
            let rate = match &view.data {
                Some(snapshot) => format!(
                    "bid {} ask {} price {}",
                    snapshot.formatted_bid(),
                    snapshot.formatted_ask(),
                    snapshot.formatted_price()
                ),
                None if view.loading && entry.is_active => "loading".to_string(),
                None => "-".to_string(),
            };
            println!(
                "{} {:<8} {:<8} {:<12} {}{}",
                entry.id,
                entry.pair_string,
                if entry.is_active { "active" } else { "inactive" },
                format!("{:?}", view.connection_state).to_lowercase(),
                rate,
                view.error.map(|e| format!(" ({})", e)).unwrap_or_default(),
            );
        }
    }
}

fn parse_pair(raw: &str) -> Result<CurrencyPair> {
    Ok(raw.parse::<CurrencyPair>()?)
}
