// src/reply.rs

use crate::error::Result;
use crate::slack::SlackClient;
use std::io::Write;

/// Where a dispatch sends its acks and final replies, in order.
pub trait Say {
    fn say(&mut self, text: &str) -> Result<()>;
}

/// Prints each reply to stdout, separated by a rule.
pub struct StdoutSay;

impl Say for StdoutSay {
    fn say(&mut self, text: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", text.trim_end())?;
        writeln!(out, "{}", "─".repeat(40))?;
        Ok(())
    }
}

/// Posts replies into the channel (and thread, if any) the mention came from.
pub struct SlackSay<'a> {
    client: &'a SlackClient,
    channel: String,
    thread_ts: Option<String>,
}

impl<'a> SlackSay<'a> {
    pub fn new(client: &'a SlackClient, channel: String, thread_ts: Option<String>) -> Self {
        Self { client, channel, thread_ts }
    }
}

impl Say for SlackSay<'_> {
    fn say(&mut self, text: &str) -> Result<()> {
        self.client
            .post_message(&self.channel, text, self.thread_ts.as_deref())
    }
}
