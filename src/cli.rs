//! Command-line front end: interactive line chat and one-shot `ask`.

use crate::completion::{CompletionApi, HttpCompletion};
use crate::config::Config;
use crate::display::{format_message, greeting, prepare_reply, truncate_title};
use crate::session::{SessionId, SessionStore, project};
use crate::sync::{Settled, Settlement, Synchronizer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Width of session titles in `/list`.
const TITLE_WIDTH: usize = 48;

/// Terminal chat client with per-session transcripts
#[derive(Parser, Debug)]
#[command(name = "chatline", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Completion endpoint URL (overrides config and CHATLINE_ENDPOINT)
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question and print the reply
    Ask(AskArgs),
}

#[derive(Parser, Debug)]
pub struct AskArgs {
    /// The prompt to send (use "-" to read from stdin)
    #[arg(required = true)]
    pub prompt: String,
}

impl Cli {
    /// Flags win over config file and environment.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint.clone_from(endpoint);
        }
        if let Some(secs) = self.timeout.filter(|s| *s > 0) {
            config.timeout_secs = secs;
        }
    }
}

/// Set up tracing. `CHATLINE_LOG` logs to `chatline.log`; otherwise `RUST_LOG`
/// logs to stderr; otherwise nothing is logged so the transcript stays clean.
pub fn init_logging() {
    if std::env::var("CHATLINE_LOG").is_ok() {
        use std::fs::File;
        use tracing_subscriber::prelude::*;
        match File::create("chatline.log") {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false);
                let filter = tracing_subscriber::EnvFilter::new("chatline=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
            }
            Err(err) => {
                eprintln!("Failed to create log file: {err}");
            }
        }
    } else if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

fn backend_for(config: &Config) -> Arc<dyn CompletionApi> {
    Arc::new(HttpCompletion::with_timeouts(
        config.endpoint.clone(),
        config.timeout(),
        config.connect_timeout(),
    ))
}

/// One-shot mode: send a single prompt in a fresh session.
pub async fn run_ask(args: AskArgs, config: &Config) -> Result<ExitCode> {
    let prompt = if args.prompt == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read prompt from stdin")?;
        buffer.trim().to_string()
    } else {
        args.prompt
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("Empty prompt");
    }

    let store = Arc::new(Mutex::new(SessionStore::new()));
    let session = store
        .lock()
        .map_err(|_| anyhow::anyhow!("session store unavailable"))?
        .active();
    let sync =
        Synchronizer::new(store, backend_for(config)).with_fallback(&config.fallback_message);

    let handle = sync
        .send(&session, &prompt)
        .context("Prompt was rejected")?;
    let settled = handle
        .settled()
        .await
        .context("Request task ended without a reply")?;

    println!("{}", prepare_reply(&settled.content));

    match settled.kind {
        Settlement::Reply => Ok(ExitCode::SUCCESS),
        Settlement::BackendError => Ok(ExitCode::FAILURE),
        Settlement::Fallback => {
            for diag in sync.diagnostics() {
                eprintln!("error: {}", diag.error);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    New,
    List,
    /// 1-based position in the `/list` output.
    Switch(usize),
    Show,
    Diag,
    Help,
    Quit,
    Send(String),
    Invalid(String),
}

/// Interpret one line of REPL input.
#[must_use]
pub fn parse_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return ReplCommand::Send(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("new"), None) => ReplCommand::New,
        (Some("list" | "ls"), None) => ReplCommand::List,
        (Some("switch" | "s"), Some(n)) => match n.parse::<usize>() {
            Ok(n) if n > 0 => ReplCommand::Switch(n),
            _ => ReplCommand::Invalid(format!("not a session number: {n}")),
        },
        (Some("switch" | "s"), None) => ReplCommand::Invalid("usage: /switch <n>".into()),
        (Some("show"), None) => ReplCommand::Show,
        (Some("diag"), None) => ReplCommand::Diag,
        (Some("help" | "?"), None) => ReplCommand::Help,
        (Some("quit" | "exit" | "q"), None) => ReplCommand::Quit,
        _ => ReplCommand::Invalid(format!("unknown command: {trimmed}")),
    }
}

const HELP: &str = "\
/new          start a new chat
/list         list chats, newest first (* = active)
/switch <n>   switch to chat n from /list
/show         reprint the active chat
/diag         show recorded connection failures
/quit         exit";

/// Interactive line-oriented chat session.
pub struct Repl {
    sync: Synchronizer,
    events: mpsc::UnboundedReceiver<Settled>,
}

impl Repl {
    pub fn new(config: &Config) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let store = Arc::new(Mutex::new(SessionStore::new()));
        let sync = Synchronizer::new(store, backend_for(config))
            .with_fallback(&config.fallback_message)
            .with_events(tx);
        Self { sync, events }
    }

    fn store(&self) -> std::sync::MutexGuard<'_, SessionStore> {
        self.sync
            .store()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn print_active(&self) {
        let mut store = self.store();
        let active = store.active();
        let Some(session) = store.get(&active) else {
            return;
        };
        println!("── {} ──", truncate_title(session.title(), TITLE_WIDTH));
        if session.messages().is_empty() {
            println!("{}", greeting());
        }
        for message in session.messages() {
            println!("{}", format_message(message));
        }
    }

    fn print_list(&self) {
        let mut store = self.store();
        let active = store.active();
        for (i, entry) in project(&store).iter().enumerate() {
            let marker = if entry.id == active { '*' } else { ' ' };
            println!(
                "{marker} {:>2}. {}  [{}]",
                i + 1,
                truncate_title(&entry.title, TITLE_WIDTH),
                entry.id.short()
            );
        }
    }

    fn switch_to(&self, position: usize) -> Option<SessionId> {
        let mut store = self.store();
        let target = project(&store).into_iter().nth(position.checked_sub(1)?)?.id;
        store.set_active(&target).then_some(target)
    }

    fn print_settled(&self, settled: &Settled) {
        let mut store = self.store();
        if store.active() == settled.session {
            let reply = prepare_reply(&settled.content);
            println!("assistant> {reply}");
        } else {
            let title = store
                .get(&settled.session)
                .map(|s| truncate_title(s.title(), 24))
                .unwrap_or_default();
            println!("(reply arrived in \"{title}\" [{}])", settled.session.short());
        }
    }

    /// Handle one command. Returns false when the user asked to quit.
    fn handle(&self, command: ReplCommand) -> bool {
        match command {
            ReplCommand::Quit => return false,
            ReplCommand::New => {
                self.store().create_session();
                self.print_active();
            }
            ReplCommand::List => self.print_list(),
            ReplCommand::Switch(n) => match self.switch_to(n) {
                Some(_) => self.print_active(),
                None => println!("no chat #{n}"),
            },
            ReplCommand::Show => self.print_active(),
            ReplCommand::Diag => {
                let diagnostics = self.sync.diagnostics();
                if diagnostics.is_empty() {
                    println!("no failures recorded");
                }
                for diag in diagnostics {
                    println!(
                        "{} [{}] {}",
                        diag.at.format("%H:%M:%S"),
                        diag.session.short(),
                        diag.error
                    );
                }
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Invalid(msg) => println!("{msg} (try /help)"),
            ReplCommand::Send(text) => {
                if text.trim().is_empty() {
                    return true;
                }
                self.store().set_draft(text);
                if self.sync.send_draft().is_some() {
                    println!("…");
                }
            }
        }
        true
    }

    fn prompt() {
        print!("> ");
        let _ = io::stdout().flush();
    }

    pub async fn run(mut self) -> Result<()> {
        self.print_active();
        Self::prompt();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read input")? else {
                        break;
                    };
                    if !self.handle(parse_command(&line)) {
                        break;
                    }
                    Self::prompt();
                }
                Some(settled) = self.events.recv() => {
                    println!();
                    self.print_settled(&settled);
                    Self::prompt();
                }
            }
        }

        // Let pending replies land before the store goes away.
        self.sync.settle_all().await;
        Ok(())
    }
}
