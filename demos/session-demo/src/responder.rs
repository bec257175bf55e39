//! Rule-based responders standing in for a model.

use agent_sessions_core::{Content, MemoryEntry, Session, event::USER_AUTHOR};
use agent_sessions_runtime::{Reply, Responder};
use serde_json::{Value, json};

const NAME_KEY: &str = "user:name";
const COUNTRY_KEY: &str = "user:country";

/// Largest order shipped without human sign-off.
const AUTO_APPROVE_LIMIT: u32 = 5;

/// Word following `marker` in `text`, trimmed of punctuation.
fn word_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let lower = text.to_lowercase();
    let start = lower.find(marker)? + marker.len();
    text.get(start..)?
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
}

/// A name introduced anywhere earlier in the conversation.
fn remembered_name(session: &Session) -> Option<String> {
    if let Some(Value::String(name)) = session.state.get(NAME_KEY) {
        return Some(name.clone());
    }
    session
        .events
        .iter()
        .filter(|e| e.author == "user")
        .filter_map(|e| e.content.as_ref()?.first_text())
        .find_map(|t| word_after(t, "i am ").or_else(|| word_after(t, "my name is ")))
        .map(str::to_string)
}

/// Chat bot that answers capitals and remembers the user's name and country.
pub fn chat_bot(session: &Session, message: &Content) -> Vec<Reply> {
    let text = message.texts().collect::<Vec<_>>().join(" ");
    let lower = text.to_lowercase();
    let mut replies = Vec::new();

    if let Some(name) = word_after(&text, "my name is ") {
        replies.push(Reply::State(NAME_KEY.to_string(), json!(name)));
    }
    if let Some(country) = word_after(&text, "from ") {
        replies.push(Reply::State(COUNTRY_KEY.to_string(), json!(country)));
    }

    if lower.contains("capital of") {
        let answer = if lower.contains("united states") {
            "The capital of the United States is Washington, D.C."
        } else if lower.contains("india") {
            "The capital of India is New Delhi."
        } else {
            "I'm not sure which capital you mean."
        };
        replies.push(Reply::text(answer));
    }

    if lower.contains("what is my name") {
        let answer = remembered_name(session).map_or_else(
            || "I don't know your name yet.".to_string(),
            |name| format!("Your name is {name}."),
        );
        replies.push(Reply::Text(answer));
    }

    if lower.contains("which country") {
        let answer = match session.state.get(COUNTRY_KEY) {
            Some(Value::String(country)) => format!("You are from {country}."),
            _ => "I don't know where you are from.".to_string(),
        };
        replies.push(Reply::Text(answer));
    }

    if replies.iter().all(|r| matches!(r, Reply::State(..))) {
        replies.push(Reply::Text(format!("Noted: {text}")));
    }
    replies
}

/// Shipping agent that needs approval for large orders.
pub fn shipping_agent(_session: &Session, message: &Content) -> Vec<Reply> {
    let text = message.texts().collect::<Vec<_>>().join(" ");
    let containers = text
        .split_whitespace()
        .find_map(|w| w.parse::<u32>().ok())
        .unwrap_or(1);

    let placed = Reply::Text(format!("Order placed for {containers} containers."));
    if containers <= AUTO_APPROVE_LIMIT {
        return vec![placed];
    }

    vec![Reply::Approval {
        hint: format!("Large order: {containers} containers"),
        on_approve: vec![placed],
        on_reject: vec![Reply::Text(format!(
            "Order for {containers} containers was rejected."
        ))],
    }]
}

/// Agent that answers questions from memories recalled across sessions.
pub struct MemoryAgent;

impl MemoryAgent {
    /// Earlier user statement sharing the most words with `question`.
    fn best_match<'a>(question: &str, memories: &'a [MemoryEntry]) -> Option<&'a str> {
        let asked: Vec<String> = question
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(str::to_lowercase)
            .collect();
        memories
            .iter()
            .filter(|m| m.author == USER_AUTHOR)
            .filter_map(|m| m.content.first_text())
            .filter(|t| !t.trim_end().ends_with('?'))
            .map(|t| {
                let lower = t.to_lowercase();
                (asked.iter().filter(|w| lower.contains(w.as_str())).count(), t)
            })
            .filter(|(score, _)| *score > 0)
            .max_by_key(|(score, _)| *score)
            .map(|(_, t)| t)
    }
}

impl Responder for MemoryAgent {
    fn respond(&self, _session: &Session, _message: &Content) -> Vec<Reply> {
        vec![Reply::text("I have no memory to search.")]
    }

    fn respond_with_memories(
        &self,
        _session: &Session,
        message: &Content,
        memories: &[MemoryEntry],
    ) -> Vec<Reply> {
        let text = message.texts().collect::<Vec<_>>().join(" ");
        if !text.trim_end().ends_with('?') {
            return vec![Reply::text("Got it, I'll remember that.")];
        }
        let answer = Self::best_match(&text, memories).map_or_else(
            || "I don't remember anything about that.".to_string(),
            |fact| format!("From an earlier conversation: \"{fact}\""),
        );
        vec![Reply::Text(answer)]
    }
}
