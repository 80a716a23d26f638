// src/dispatch.rs

use crate::db::RecordStore;
use crate::error::{BotError, Result};
use crate::generate::{TaskKind, TextService};
use crate::models::{InboundEvent, DEFAULT_TAGS};
use crate::reply::Say;
use std::io::BufRead;
use tracing::{debug, error, info, warn};

const SKIP_TOKEN: &str = "!skip";

pub const HELP_TEXT: &str = "Available commands:
• `!draft <text>` - draft a reply to the text
• `!summary <text>` - summarise and enrich the text
• `!log <text>` - summarise and log the text (add `!skip` to store it verbatim)
• `!dig <text>` - research the text and log it";

/// A message with the mention stripped, split into its first token and the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: String,
}

impl Invocation {
    pub fn parse(raw: &str, mention: &str) -> Self {
        let stripped = if mention.is_empty() {
            raw.to_string()
        } else {
            raw.replace(mention, "")
        };
        let mut tokens = stripped.split_whitespace();
        let command = tokens.next().unwrap_or("").to_string();
        let args = tokens.collect::<Vec<_>>().join(" ");
        Self { command, args }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub text: String,
    pub skip_generation: bool,
    pub override_summary: Option<String>,
}

impl LogRequest {
    fn from_args(args: &str) -> Self {
        let tokens: Vec<&str> = args.split(' ').collect();
        if tokens.contains(&SKIP_TOKEN) {
            let remaining = tokens
                .into_iter()
                .filter(|t| *t != SKIP_TOKEN)
                .collect::<Vec<_>>()
                .join(" ");
            Self {
                text: remaining.clone(),
                skip_generation: true,
                override_summary: Some(remaining),
            }
        } else {
            Self {
                text: args.to_string(),
                skip_generation: false,
                override_summary: None,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Draft(String),
    Summary(String),
    Log(LogRequest),
    Dig(String),
    Help,
    Ignored,
}

impl Command {
    pub fn from_invocation(inv: &Invocation) -> Self {
        let args = inv.args.as_str();
        match inv.command.as_str() {
            "!help" => Command::Help,
            _ if args.is_empty() => Command::Ignored,
            "!draft" => Command::Draft(args.to_string()),
            "!summary" => Command::Summary(args.to_string()),
            "!log" => Command::Log(LogRequest::from_args(args)),
            "!dig" => Command::Dig(args.to_string()),
            _ => Command::Ignored,
        }
    }

    fn ack(&self) -> Option<&'static str> {
        match self {
            Command::Draft(_) => Some("Drafting..."),
            Command::Summary(_) => Some("Summarising..."),
            Command::Log(_) => Some("Logging..."),
            Command::Dig(_) => Some("Digging..."),
            Command::Help | Command::Ignored => None,
        }
    }
}

/// Outcome counts for one stream of events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventTally {
    pub handled: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Handles one mention at a time against an owned store and text service.
pub struct Dispatcher<S, T> {
    store: S,
    text: T,
    mention: String,
}

impl<S: RecordStore, T: TextService> Dispatcher<S, T> {
    pub fn new(store: S, text: T, mention: String) -> Self {
        Self { store, text, mention }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs a full dispatch for `raw`. Returns the final reply, if one was sent.
    pub fn handle(&self, raw: &str, say: &mut dyn Say) -> Result<Option<String>> {
        let inv = Invocation::parse(raw, &self.mention);

        if !inv.args.is_empty() {
            if let Some(summary) = self.store.find_summary_by_text(&inv.args)? {
                info!(command = %inv.command, "cache hit, replying with stored summary");
                return send(say, summary);
            }
        }

        let command = Command::from_invocation(&inv);
        debug!(?command, "dispatching");

        if let Some(ack) = command.ack() {
            say.say(ack)?;
        }

        let response = match command {
            Command::Draft(input) => self.draft(&input)?,
            Command::Summary(input) => self.summarise(&input)?,
            Command::Log(request) => self.log(&request)?,
            Command::Dig(input) => self.dig(&input)?,
            Command::Help => HELP_TEXT.to_string(),
            Command::Ignored => String::new(),
        };

        send(say, response)
    }

    /// Dispatches newline-delimited JSON events in order. A line that is not UTF-8 or not an
    /// event is skipped, and a failed dispatch only fails that event.
    pub fn run_events<'a, R: BufRead>(
        &self,
        mut reader: R,
        mut reply_to: impl FnMut(&InboundEvent) -> Box<dyn Say + 'a>,
    ) -> Result<EventTally> {
        let mut tally = EventTally::default();
        let mut buf = Vec::new();
        let mut lineno = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            lineno += 1;

            let line = match std::str::from_utf8(&buf) {
                Ok(l) => l,
                Err(e) => {
                    warn!(line = lineno, error = %e, "skipping event that is not valid UTF-8");
                    tally.skipped += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let event = match InboundEvent::from_json(line) {
                Ok(e) => e,
                Err(e) => {
                    warn!(line = lineno, error = %e, "skipping malformed event");
                    tally.skipped += 1;
                    continue;
                }
            };

            let mut say = reply_to(&event);
            match self.handle(&event.text, say.as_mut()) {
                Ok(_) => tally.handled += 1,
                Err(e) => {
                    error!(line = lineno, error = %e, "event dispatch failed");
                    tally.failed += 1;
                }
            }
        }

        Ok(tally)
    }

    fn draft(&self, input: &str) -> Result<String> {
        let reply = self.generate(TaskKind::Draft, input)?;
        self.store.append(input, &reply, DEFAULT_TAGS)?;
        Ok(reply)
    }

    fn summarise(&self, input: &str) -> Result<String> {
        let summary = self.generate(TaskKind::Summarise, input)?;
        self.record(&LogRequest {
            text: input.to_string(),
            skip_generation: true,
            override_summary: Some(summary.clone()),
        })?;
        Ok(summary)
    }

    fn log(&self, request: &LogRequest) -> Result<String> {
        let timestamp = self.record(request)?;
        Ok(format!("Logged at {timestamp}"))
    }

    fn dig(&self, input: &str) -> Result<String> {
        let findings = self.generate(TaskKind::Research, input)?;
        self.record(&LogRequest {
            text: input.to_string(),
            skip_generation: false,
            override_summary: None,
        })?;
        Ok(findings)
    }

    fn record(&self, request: &LogRequest) -> Result<String> {
        let summary = if request.skip_generation {
            request.override_summary.clone().unwrap_or_default()
        } else {
            self.generate(TaskKind::Summarise, &request.text)?
        };
        self.store.append(&request.text, &summary, DEFAULT_TAGS)
    }

    /// Generated text is never empty; an empty result would be cached and silence the text for good.
    fn generate(&self, kind: TaskKind, input: &str) -> Result<String> {
        let text = self.text.generate(kind, input)?;
        if text.trim().is_empty() {
            warn!(kind = kind.as_str(), "text service returned nothing");
            return Err(BotError::EmptyGeneration(kind.as_str()));
        }
        Ok(text)
    }
}

/// Empty responses are a silent no-op.
fn send(say: &mut dyn Say, response: String) -> Result<Option<String>> {
    if response.is_empty() {
        return Ok(None);
    }
    say.say(&response)?;
    Ok(Some(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_entries, initialize_db, open_connection, SqliteStore};
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;
    use tempfile::TempDir;

    const MENTION: &str = "<@UBOT>";

    #[derive(Default)]
    enum Behaviour {
        #[default]
        Echo,
        Empty,
        Fail,
    }

    #[derive(Default)]
    struct FakeText {
        calls: RefCell<Vec<(TaskKind, String)>>,
        behaviour: Behaviour,
    }

    impl FakeText {
        fn with(behaviour: Behaviour) -> Self {
            Self {
                calls: RefCell::default(),
                behaviour,
            }
        }
    }

    impl TextService for FakeText {
        fn generate(&self, kind: TaskKind, input: &str) -> Result<String> {
            self.calls.borrow_mut().push((kind, input.to_string()));
            match (&self.behaviour, kind) {
                (_, TaskKind::Research) => Ok(input.to_string()),
                (Behaviour::Empty, _) => Ok(String::new()),
                (Behaviour::Fail, _) => Err(BotError::Api {
                    status: 500,
                    message: "boom".to_string(),
                }),
                (Behaviour::Echo, TaskKind::Draft) => Ok(format!("draft of {input}")),
                (Behaviour::Echo, TaskKind::Summarise) => Ok(format!("summary of {input}")),
            }
        }
    }

    /// Collects replies from every event of a stream into one list.
    #[derive(Clone, Default)]
    struct SharedRecorder(Rc<RefCell<Vec<String>>>);

    impl Say for SharedRecorder {
        fn say(&mut self, text: &str) -> Result<()> {
            self.0.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl Say for Recorder {
        fn say(&mut self, text: &str) -> Result<()> {
            self.0.push(text.to_string());
            Ok(())
        }
    }

    fn dispatcher() -> (TempDir, Dispatcher<SqliteStore, FakeText>) {
        dispatcher_with(Behaviour::Echo)
    }

    fn dispatcher_with(behaviour: Behaviour) -> (TempDir, Dispatcher<SqliteStore, FakeText>) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs.db");
        initialize_db(&path).unwrap();
        let d = Dispatcher::new(SqliteStore::new(path), FakeText::with(behaviour), MENTION.to_string());
        (tmp, d)
    }

    fn rows(d: &Dispatcher<SqliteStore, FakeText>) -> usize {
        count_entries(&open_connection(d.store().path()).unwrap()).unwrap()
    }

    fn calls(d: &Dispatcher<SqliteStore, FakeText>) -> Vec<(TaskKind, String)> {
        d.text.calls.borrow().clone()
    }

    #[test]
    fn parse_strips_mention_and_collapses_whitespace() {
        let inv = Invocation::parse("<@UBOT>   !draft  hello \n  world  ", MENTION);
        assert_eq!(inv.command, "!draft");
        assert_eq!(inv.args, "hello world");
    }

    #[test]
    fn parse_empty_message() {
        let inv = Invocation::parse("<@UBOT>", MENTION);
        assert_eq!(inv.command, "");
        assert_eq!(inv.args, "");
    }

    #[test]
    fn commands_are_case_sensitive_and_need_args() {
        let cmd = |s: &str| Command::from_invocation(&Invocation::parse(s, MENTION));
        assert_eq!(cmd("!DRAFT hi"), Command::Ignored);
        assert_eq!(cmd("!draft"), Command::Ignored);
        assert_eq!(cmd("!help"), Command::Help);
        assert_eq!(cmd("!dig rust"), Command::Dig("rust".into()));
        assert_eq!(
            cmd("!log a !skip b"),
            Command::Log(LogRequest {
                text: "a b".into(),
                skip_generation: true,
                override_summary: Some("a b".into()),
            })
        );
    }

    #[test]
    fn draft_acks_then_replies_and_logs_once() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        let reply = d.handle("<@UBOT> !draft see you Monday", &mut say).unwrap();

        assert_eq!(say.0, vec!["Drafting...", "draft of see you Monday"]);
        assert_eq!(reply.as_deref(), Some("draft of see you Monday"));
        assert_eq!(rows(&d), 1);
        assert_eq!(calls(&d), vec![(TaskKind::Draft, "see you Monday".to_string())]);
        assert_eq!(
            d.store().find_summary_by_text("see you Monday").unwrap().as_deref(),
            Some("draft of see you Monday")
        );
    }

    #[test]
    fn summary_acks_then_replies_and_logs_once() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        d.handle("<@UBOT> !summary borrow checker", &mut say).unwrap();

        assert_eq!(say.0, vec!["Summarising...", "summary of borrow checker"]);
        assert_eq!(rows(&d), 1);
        assert_eq!(calls(&d).len(), 1);
    }

    #[test]
    fn log_with_skip_stores_verbatim_without_generation() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        d.handle("<@UBOT> !log foo !skip", &mut say).unwrap();

        assert!(calls(&d).is_empty());
        assert_eq!(d.store().find_summary_by_text("foo").unwrap().as_deref(), Some("foo"));
        assert_eq!(say.0.len(), 2);
        assert_eq!(say.0[0], "Logging...");
        assert!(say.0[1].starts_with("Logged at "));
    }

    #[test]
    fn log_without_skip_generates_one_summary() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        d.handle("<@UBOT> !log foo", &mut say).unwrap();

        assert_eq!(calls(&d), vec![(TaskKind::Summarise, "foo".to_string())]);
        assert_eq!(
            d.store().find_summary_by_text("foo").unwrap().as_deref(),
            Some("summary of foo")
        );
        assert_eq!(rows(&d), 1);
    }

    #[test]
    fn log_skip_alone_stores_empty_summary() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        d.handle("!log !skip", &mut say).unwrap();

        assert!(calls(&d).is_empty());
        assert_eq!(d.store().find_summary_by_text("").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn dig_returns_input_and_logs_once() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        let reply = d.handle("<@UBOT> !dig sqlite wal", &mut say).unwrap();

        assert_eq!(reply.as_deref(), Some("sqlite wal"));
        assert_eq!(say.0, vec!["Digging...", "sqlite wal"]);
        assert_eq!(rows(&d), 1);
    }

    #[test]
    fn help_replies_once_without_logging() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        d.handle("<@UBOT> !help", &mut say).unwrap();

        assert_eq!(say.0, vec![HELP_TEXT]);
        assert_eq!(rows(&d), 0);
        assert!(calls(&d).is_empty());
    }

    #[test]
    fn unknown_command_is_silent() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        let reply = d.handle("<@UBOT> !xyz foo", &mut say).unwrap();

        assert!(reply.is_none());
        assert!(say.0.is_empty());
        assert_eq!(rows(&d), 0);
    }

    #[test]
    fn command_without_args_is_silent() {
        let (_tmp, d) = dispatcher();
        let mut say = Recorder::default();
        d.handle("<@UBOT> !draft   ", &mut say).unwrap();

        assert!(say.0.is_empty());
        assert!(calls(&d).is_empty());
    }

    #[test]
    fn cached_text_short_circuits_any_command() {
        let (_tmp, d) = dispatcher();
        d.store().append("release notes", "cached summary", DEFAULT_TAGS).unwrap();

        for raw in ["!draft release notes", "!xyz release notes", "!help release notes"] {
            let mut say = Recorder::default();
            let reply = d.handle(raw, &mut say).unwrap();
            assert_eq!(reply.as_deref(), Some("cached summary"));
            assert_eq!(say.0, vec!["cached summary"]);
        }

        assert!(calls(&d).is_empty());
        assert_eq!(rows(&d), 1);
    }

    #[test]
    fn empty_cached_summary_sends_nothing() {
        let (_tmp, d) = dispatcher();
        d.store().append("quiet", "", DEFAULT_TAGS).unwrap();

        let mut say = Recorder::default();
        assert!(d.handle("!summary quiet", &mut say).unwrap().is_none());
        assert!(say.0.is_empty());
        assert_eq!(rows(&d), 1);
    }

    #[test]
    fn second_identical_draft_hits_cache() {
        let (_tmp, d) = dispatcher();
        let mut first = Recorder::default();
        d.handle("!draft lunch?", &mut first).unwrap();

        let mut second = Recorder::default();
        d.handle("!draft lunch?", &mut second).unwrap();

        assert_eq!(second.0, vec!["draft of lunch?"]);
        assert_eq!(calls(&d).len(), 1);
        assert_eq!(rows(&d), 1);
    }

    #[test]
    fn empty_generation_is_an_error_and_never_cached() {
        let (_tmp, d) = dispatcher_with(Behaviour::Empty);

        let mut first = Recorder::default();
        let err = d.handle("!summary hello", &mut first).unwrap_err();
        assert!(matches!(err, BotError::EmptyGeneration("summarise")));
        assert_eq!(first.0, vec!["Summarising..."]);
        assert_eq!(rows(&d), 0);

        let mut second = Recorder::default();
        assert!(d.handle("!summary hello", &mut second).is_err());
        assert_eq!(second.0, vec!["Summarising..."]);
        assert_eq!(calls(&d).len(), 2);
        assert!(d.store().find_summary_by_text("hello").unwrap().is_none());
    }

    #[test]
    fn empty_draft_and_log_store_nothing() {
        let (_tmp, d) = dispatcher_with(Behaviour::Empty);
        let mut say = Recorder::default();

        assert!(d.handle("!draft hi", &mut say).is_err());
        assert!(d.handle("!log notes", &mut say).is_err());
        assert!(d.handle("!dig topic", &mut say).is_err());
        assert_eq!(rows(&d), 0);
    }

    #[test]
    fn service_failure_propagates_after_ack_without_logging() {
        let (_tmp, d) = dispatcher_with(Behaviour::Fail);
        let mut say = Recorder::default();

        let err = d.handle("<@UBOT> !draft quarterly plan", &mut say).unwrap_err();
        assert_eq!(err.to_string(), "API error (500): boom");
        assert_eq!(say.0, vec!["Drafting..."]);
        assert_eq!(rows(&d), 0);
    }

    #[test]
    fn skip_log_survives_service_failure() {
        let (_tmp, d) = dispatcher_with(Behaviour::Fail);
        let mut say = Recorder::default();

        d.handle("!log keep this !skip", &mut say).unwrap();
        assert!(calls(&d).is_empty());
        assert_eq!(rows(&d), 1);
    }

    #[test]
    fn event_stream_skips_bad_lines_and_keeps_going() {
        let (_tmp, d) = dispatcher();
        let input: &[u8] = b"{\"text\":\"<@UBOT> !help\"}\n\xff\xfe bad\n\nnot json\n{\"event\":{\"text\":\"<@UBOT> !dig wal\",\"channel\":\"C1\"}}\n";
        let replies = SharedRecorder::default();

        let tally = d
            .run_events(Cursor::new(input), |_| Box::new(replies.clone()))
            .unwrap();

        assert_eq!(tally, EventTally { handled: 2, skipped: 2, failed: 0 });
        assert_eq!(*replies.0.borrow(), vec![HELP_TEXT, "Digging...", "wal"]);
        assert_eq!(rows(&d), 1);
    }

    #[test]
    fn event_stream_isolates_failed_dispatch() {
        let (_tmp, d) = dispatcher_with(Behaviour::Fail);
        let input = "{\"text\":\"!draft one\"}\n{\"text\":\"!help\"}";
        let replies = SharedRecorder::default();
        let mut channels = Vec::new();

        let tally = d
            .run_events(Cursor::new(input), |event| {
                channels.push(event.channel.clone());
                Box::new(replies.clone())
            })
            .unwrap();

        assert_eq!(tally, EventTally { handled: 1, skipped: 0, failed: 1 });
        assert_eq!(*replies.0.borrow(), vec!["Drafting...", HELP_TEXT]);
        assert_eq!(channels, vec![None, None]);
        assert_eq!(rows(&d), 0);
    }
}
