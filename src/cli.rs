// src/cli.rs

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "mention-bot - Draft, summarise, log and research text mentioned to a chat bot",
    long_about = "mention-bot handles @-mentions of a chat bot. Each mention is parsed into a command (!draft, !summary, !log, !dig, !help), answered through a language model, and recorded in a local SQLite log so repeated texts are answered from the log."
)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Path of the SQLite log. Defaults to ~/.config/mention-bot/logs.db
    #[arg(long, global = true, env = "MENTION_BOT_DB")]
    pub db: Option<PathBuf>,

    #[arg(long, global = true, env = "SLACK_BOT_USER_ID", help = "User id of the bot, used to strip <@ID> mentions")]
    pub bot_user_id: Option<String>,

    #[arg(long, global = true, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, global = true, help = "Base URL of an OpenAI-compatible API")]
    pub base_url: Option<String>,

    #[arg(long, global = true, help = "Chat model used for drafts and summaries")]
    pub model: Option<String>,

    #[arg(long, global = true, help = "Name used to sign drafted replies")]
    pub name: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Creates the log table if it does not exist.
    Init,

    /// Dispatches a single mention and prints the replies.
    /// If no text is given, the message is read from stdin.
    Mention {
        /// Raw message text, e.g. "<@U123> !summary some text"
        text: Option<String>,
    },

    /// Reads newline-delimited JSON events from stdin and dispatches each one.
    Events {
        #[arg(long, help = "Post replies to the event's Slack channel instead of stdout")]
        post: bool,
    },

    /// Lists logged entries, newest first.
    Get {
        #[arg(short, long, help = "Show latest N entries (default: 10)")]
        num: Option<u32>,

        #[arg(short, long, help = "Search for a keyword in text and summary")]
        search: Option<String>,
    },

    /// Prints the bot user id reported by Slack's auth.test.
    Whoami,
}
