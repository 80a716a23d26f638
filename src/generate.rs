// src/generate.rs

use crate::error::{BotError, Result};
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_NAME: &str = "Danny";

pub const DRAFT_FALLBACK: &str = "I'm not sure how to respond to this email, please tell me more.";
pub const SUMMARY_FALLBACK: &str = "I'm not sure how to summarise this";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Draft,
    Summarise,
    Research,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Draft => "draft",
            TaskKind::Summarise => "summarise",
            TaskKind::Research => "research",
        }
    }
}

/// Turns input text into generated text for one task kind.
pub trait TextService {
    fn generate(&self, kind: TaskKind, input: &str) -> Result<String>;
}

/// System instruction, user message and temperature for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f64,
}

/// `None` for kinds that never reach the model.
pub fn build_prompt(kind: TaskKind, input: &str, name: &str) -> Option<Prompt> {
    match kind {
        TaskKind::Draft => Some(Prompt {
            system: format!(
                "You are an intuitive and helpful assistant that drafts a professional email reply based on the input text. \
                 Your goal is to help the user quickly create a perfect email reply that is relevant and helpful. \
                 Keep your reply short and to the point and mimic the style of the email so you reply in a similar manner to match the tone. \
                 Overall it should be informal but professional, and use British English spelling and grammar. \
                 Make sure to sign off with Thanks,\n{name}. \
                 Check the spelling and convert American English words like optimize to optimise. \
                 If you are unsure how to respond, just say \"{DRAFT_FALLBACK}\" and the user will post additional information for you to use in formulating your reply."
            ),
            user: format!(
                "Here's the email to reply to and consider any other comments from the user for the reply as well: {input}"
            ),
            temperature: 0.3,
        }),
        TaskKind::Summarise => Some(Prompt {
            system: format!(
                "You are a helpful assistant that summarises, contextualises and enriches input text. \
                 Your goal is to analyse the text and then summarise with additional context and content that will make it easier for the user to recall and understand in future. \
                 Keep your summary short and to the point, and make your summary and additional context useful and insightful. \
                 Where possible add sections for 'Key Terms' and 'Related Topics'. \
                 If it is code or technical related, please try and include links to relevant documentation. \
                 Do not include the original text in your summary. Do not include any of the instructions in your summary. \
                 Use British English spelling and grammar. Surround code blocks with ```. \
                 If you are unsure how to summarise the text, just say \"{SUMMARY_FALLBACK}\"."
            ),
            user: format!(
                "Here's the text to analyse, summarise and enrich with additional context, key terms and related topics: {input}"
            ),
            temperature: 0.1,
        }),
        TaskKind::Research => None,
    }
}

/// OpenAI-compatible chat completions backend. One blocking call per generation, no retries.
pub struct ChatCompletions {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
    name: String,
}

impl ChatCompletions {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>, name: Option<String>) -> Self {
        Self {
            client: untimed_client(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            name: name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
        }
    }

    fn complete(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = build_request_body(&self.model, prompt);

        debug!(model = %self.model, "sending request to chat completions");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().unwrap_or_default();
            warn!(status, body = %text, "chat completions API error");
            return Err(BotError::Api { status, message: text });
        }

        let text = resp.text()?;
        parse_response(&text)
    }
}

impl TextService for ChatCompletions {
    fn generate(&self, kind: TaskKind, input: &str) -> Result<String> {
        match build_prompt(kind, input, &self.name) {
            Some(prompt) => self.complete(&prompt),
            None => Ok(input.to_string()),
        }
    }
}

/// Generation calls are allowed to run as long as the backend takes.
pub(crate) fn untimed_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(None::<std::time::Duration>)
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

fn build_request_body(model: &str, prompt: &Prompt) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "temperature": prompt.temperature,
        "messages": [
            { "role": "system", "content": prompt.system },
            { "role": "user", "content": prompt.user },
        ],
    })
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// A missing choice or blank content is an error, never an empty string.
fn parse_response(body: &str) -> Result<String> {
    let resp: ApiResponse = serde_json::from_str(body)?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(BotError::EmptyGeneration("chat completion"))
}
