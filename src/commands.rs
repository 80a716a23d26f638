// src/commands.rs

use crate::cli::Config;
use crate::db::{self, SqliteStore};
use crate::dispatch::Dispatcher;
use crate::error::{BotError, Result};
use crate::generate::ChatCompletions;
use crate::reply::{Say, SlackSay, StdoutSay};
use crate::slack::{mention_marker, SlackClient};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

fn db_path(config: &Config) -> Result<PathBuf> {
    match &config.db {
        Some(p) => Ok(p.clone()),
        None => db::default_db_path(),
    }
}

/// Table creation failures are reported but do not stop the bot from starting.
fn ensure_db(path: &Path) {
    match db::initialize_db(path) {
        Ok(()) => info!(path = %path.display(), "log table ready"),
        Err(e) => error!(error = %e, "error creating log table"),
    }
}

fn slack_client(config: &Config) -> Result<SlackClient> {
    let token = config
        .bot_token
        .clone()
        .ok_or(BotError::MissingConfig("SLACK_BOT_TOKEN"))?;
    Ok(SlackClient::new(token))
}

fn bot_user_id(config: &Config) -> Result<String> {
    if let Some(id) = &config.bot_user_id {
        return Ok(id.clone());
    }
    let client = slack_client(config).map_err(|_| BotError::MissingConfig("SLACK_BOT_USER_ID"))?;
    client.auth_test()
}

fn build_dispatcher(config: &Config) -> Result<Dispatcher<SqliteStore, ChatCompletions>> {
    let path = db_path(config)?;
    ensure_db(&path);

    let api_key = config
        .api_key
        .clone()
        .ok_or(BotError::MissingConfig("OPENAI_API_KEY"))?;
    let text = ChatCompletions::new(
        api_key,
        config.base_url.clone(),
        config.model.clone(),
        config.name.clone(),
    );
    let mention = mention_marker(&bot_user_id(config)?);
    Ok(Dispatcher::new(SqliteStore::new(path), text, mention))
}

/// Handles the 'init' command
pub fn handle_init(config: &Config) -> Result<()> {
    let path = db_path(config)?;
    db::initialize_db(&path)?;
    println!("✓ Database initialized successfully at: {:?}", path);
    Ok(())
}

/// Handles the 'mention' command
pub fn handle_mention(config: &Config, text: Option<String>) -> Result<()> {
    let raw = match text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    if raw.trim().is_empty() {
        return Err(BotError::InvalidInput("Empty message.".to_string()));
    }

    let dispatcher = build_dispatcher(config)?;
    if dispatcher.handle(&raw, &mut StdoutSay)?.is_none() {
        eprintln!("No reply.");
    }
    Ok(())
}

/// Handles the 'events' command. A failing event is logged and the loop moves on.
pub fn handle_events(config: &Config, post: bool) -> Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let slack = if post { Some(slack_client(config)?) } else { None };
    info!(db = %dispatcher.store().path().display(), post, "reading events from stdin");

    let tally = dispatcher.run_events(io::stdin().lock(), |event| {
        let say: Box<dyn Say + '_> = match (&slack, &event.channel) {
            (Some(client), Some(channel)) => {
                Box::new(SlackSay::new(client, channel.clone(), event.thread_ts.clone()))
            }
            (Some(_), None) => {
                warn!("event has no channel, replying on stdout");
                Box::new(StdoutSay)
            }
            (None, _) => Box::new(StdoutSay),
        };
        say
    })?;

    info!(handled = tally.handled, skipped = tally.skipped, failed = tally.failed, "event stream closed");
    Ok(())
}

/// Handles the 'get' command
pub fn handle_get(config: &Config, num: Option<u32>, search: Option<String>) -> Result<()> {
    let limit = num.unwrap_or(10);
    let conn = db::open_connection(&db_path(config)?)?;
    let entries = db::fetch_entries(&conn, limit, search.as_deref())?;

    if entries.is_empty() {
        println!("No entries found.");
        return Ok(());
    }

    println!("Showing {} of {} entries", entries.len(), db::count_entries(&conn)?);

    for entry in entries {
        println!("[{}] {} | Tags: {}", entry.id, entry.timestamp, entry.tags);
        println!("  └─ Text: {}", entry.text);
        println!("{}", entry.summary.trim_end());
        println!("{}", "─".repeat(40));
    }
    Ok(())
}

/// Handles the 'whoami' command
pub fn handle_whoami(config: &Config) -> Result<()> {
    let user_id = slack_client(config)?.auth_test()?;
    println!("{} (mention marker: {})", user_id, mention_marker(&user_id));
    Ok(())
}
