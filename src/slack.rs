// src/slack.rs

use crate::error::{BotError, Result};
use serde_json::Value;
use tracing::{debug, warn};

const SLACK_API: &str = "https://slack.com/api";

/// Minimal Web API client: identity lookup and message posting.
pub struct SlackClient {
    client: reqwest::blocking::Client,
    bot_token: String,
}

impl SlackClient {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: crate::generate::untimed_client(),
            bot_token,
        }
    }

    /// Resolves the bot's own user id via `auth.test`.
    pub fn auth_test(&self) -> Result<String> {
        let body = self
            .client
            .get(format!("{SLACK_API}/auth.test"))
            .bearer_auth(&self.bot_token)
            .send()?
            .text()?;
        let parsed = check_ok("auth.test", &body)?;
        parsed
            .get("user_id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| BotError::Slack("auth.test response has no user_id".to_string()))
    }

    pub fn post_message(&self, channel: &str, text: &str, thread_ts: Option<&str>) -> Result<()> {
        let mut payload = serde_json::json!({
            "channel": channel,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = serde_json::json!(ts);
        }

        debug!(channel, "posting Slack message");
        let resp = self
            .client
            .post(format!("{SLACK_API}/chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&payload)
            .send()?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            warn!(status = status.as_u16(), body = %body, "chat.postMessage failed");
            return Err(BotError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        check_ok("chat.postMessage", &body)?;
        Ok(())
    }
}

/// The mention token Slack inserts for a user id, e.g. `<@U123>`.
pub fn mention_marker(bot_user_id: &str) -> String {
    format!("<@{bot_user_id}>")
}

/// Slack answers most app-level failures with 200 and `"ok": false`.
fn check_ok(method: &str, body: &str) -> Result<Value> {
    let parsed: Value = serde_json::from_str(body)?;
    if parsed.get("ok") == Some(&Value::Bool(false)) {
        let err = parsed
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(BotError::Slack(format!("{method} failed: {err}")));
    }
    Ok(parsed)
}
