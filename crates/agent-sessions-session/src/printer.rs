//! Human-readable rendering of events, sessions and memories.

use std::io::{self, Write};

use agent_sessions_core::{Event, SearchMemoryResponse, Session};

/// Placeholder text some models emit instead of an empty reply.
pub const PLACEHOLDER_TEXT: &str = "None";

/// Fence marker a code executor emits around an empty result.
const EMPTY_FENCE: &str = "```";
/// Marker a code executor puts in front of generated code.
const TOOL_CODE_MARKER: &str = "tool_code";

/// Whether a text fragment is worth printing.
#[must_use]
pub fn is_printable(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && text != PLACEHOLDER_TEXT
}

/// Prefix used in front of each printed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// The same label for every event, typically the model name.
    Fixed(String),
    /// The author of each event.
    Author,
}

/// Prints the text parts of events as `{label} > {text}` lines.
#[derive(Debug, Clone)]
pub struct EventPrinter {
    label: Label,
}

impl EventPrinter {
    #[must_use]
    pub const fn new(label: Label) -> Self {
        Self { label }
    }

    /// Printer labelling every line with `label`.
    #[must_use]
    pub fn fixed(label: impl Into<String>) -> Self {
        Self::new(Label::Fixed(label.into()))
    }

    /// Print one event. Returns the number of lines written.
    ///
    /// Events without content are skipped, as are empty and placeholder texts.
    ///
    /// # Errors
    /// Returns error if writing fails.
    pub fn print_event(&self, event: &Event, out: &mut dyn Write) -> io::Result<usize> {
        let label = match &self.label {
            Label::Fixed(label) => label.as_str(),
            Label::Author => event.author.as_str(),
        };

        let mut lines = 0;
        for text in event
            .parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .filter(|t| is_printable(t))
        {
            writeln!(out, "{label} > {text}")?;
            lines += 1;
        }
        Ok(lines)
    }

    /// Print a batch of events in order.
    ///
    /// # Errors
    /// Returns error if writing fails.
    pub fn print_events<'a, I>(&self, events: I, out: &mut dyn Write) -> io::Result<usize>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut lines = 0;
        for event in events {
            lines += self.print_event(event, out)?;
        }
        Ok(lines)
    }
}

/// First `max` characters of `text`.
fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Print a one-line summary per event: `{role}: {first 60 chars}...`.
///
/// # Errors
/// Returns error if writing fails.
pub fn describe_session(session: &Session, out: &mut dyn Write) -> io::Result<()> {
    for event in &session.events {
        match &event.content {
            Some(content) => {
                let text = content.first_text().map_or_else(
                    || "(empty)".to_string(),
                    |t| preview(t, 60),
                );
                writeln!(out, "  {}: {text}...", content.role)?;
            }
            None => writeln!(out, "  {}: (empty)...", event.author)?,
        }
    }
    Ok(())
}

/// Print memory search results as `[{author}]: {first 80 chars}...`.
///
/// # Errors
/// Returns error if writing fails.
pub fn print_memories(response: &SearchMemoryResponse, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "  Found {} relevant memories", response.memories.len())?;
    writeln!(out)?;
    for memory in &response.memories {
        if let Some(text) = memory.content.first_text() {
            writeln!(out, "  [{}]: {}...", memory.author, preview(text, 80))?;
        }
    }
    Ok(())
}

/// First event carrying a compaction marker.
#[must_use]
pub fn find_compaction_event(events: &[Event]) -> Option<&Event> {
    events.iter().find(|e| e.is_compaction())
}

/// Output of a code-executing tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeExecution {
    /// Code the model generated, marker stripped.
    Code(String),
    /// Result of running it.
    Output(String),
}

/// Extract code-execution results from events, in order.
///
/// Only the first part of each event is inspected. Responses without a string
/// `result`, or whose result is a bare fence, are skipped.
#[must_use]
pub fn code_execution_results(events: &[Event]) -> Vec<CodeExecution> {
    events
        .iter()
        .filter_map(|event| {
            let response = event.parts().first()?.function_response.as_ref()?;
            let result = response.response.get("result")?.as_str()?;
            if result == EMPTY_FENCE {
                return None;
            }
            Some(if result.contains(TOOL_CODE_MARKER) {
                CodeExecution::Code(result.replace(TOOL_CODE_MARKER, ""))
            } else {
                CodeExecution::Output(result.to_string())
            })
        })
        .collect()
}

/// Print code-execution results.
///
/// # Errors
/// Returns error if writing fails.
pub fn print_code_execution(events: &[Event], out: &mut dyn Write) -> io::Result<()> {
    for result in code_execution_results(events) {
        match result {
            CodeExecution::Code(code) => writeln!(out, "Generated Python Code >> {code}")?,
            CodeExecution::Output(output) => writeln!(out, "Generated Python Response >> {output}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use agent_sessions_core::{
        Content, EventCompaction, FunctionResponse, MemoryEntry, Part, Role, SessionKey,
    };
    use serde_json::json;

    use super::*;

    fn text_event(author: &str, text: &str) -> Event {
        Event::new("inv", author).with_content(Content::model_text(text))
    }

    fn render(f: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_placeholder_is_suppressed() {
        let events = vec![text_event("agent", "None"), text_event("agent", "Hi")];
        let printer = EventPrinter::fixed("model");
        let output = render(|out| printer.print_events(&events, out).map(drop));
        assert_eq!(output, "model > Hi\n");
    }

    #[test]
    fn test_padded_placeholder_is_suppressed() {
        assert!(!is_printable(" None \n"));
        assert!(!is_printable("   "));
        assert!(is_printable(" Nonetheless "));
    }

    #[test]
    fn test_empty_and_contentless_events_are_skipped() {
        let events = vec![
            Event::new("inv", "agent"),
            text_event("agent", ""),
            Event::new("inv", "agent").with_content(Content {
                role: Role::Model,
                parts: vec![Part::default()],
            }),
        ];
        let mut buf = Vec::new();
        let lines = EventPrinter::fixed("model").print_events(&events, &mut buf).unwrap();
        assert_eq!(lines, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_author_label_and_multiple_parts() {
        let event = Event::new("inv", "WriterAgent").with_content(Content {
            role: Role::Model,
            parts: vec![Part::text("first"), Part::text("second")],
        });
        let printer = EventPrinter::new(Label::Author);
        let output = render(|out| printer.print_event(&event, out).map(drop));
        assert_eq!(output, "WriterAgent > first\nWriterAgent > second\n");
    }

    #[test]
    fn test_describe_session_truncates() {
        let key = SessionKey::new("app", "user", "s1");
        let mut session = Session::new(&key, HashMap::new());
        session.apply_event(
            Event::new("inv", "user").with_content(Content::user_text("x".repeat(100))),
        );
        session.apply_event(Event::new("inv", "agent"));

        let output = render(|out| describe_session(&session, out));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], format!("  user: {}...", "x".repeat(60)));
        assert_eq!(lines[1], "  agent: (empty)...");
    }

    #[test]
    fn test_print_memories() {
        let response = SearchMemoryResponse {
            memories: vec![MemoryEntry {
                author: "user".to_string(),
                content: Content::user_text("My favorite color is blue-green."),
                timestamp: 0,
            }],
        };
        let output = render(|out| print_memories(&response, out));
        assert!(output.starts_with("  Found 1 relevant memories\n"));
        assert!(output.contains("  [user]: My favorite color is blue-green....\n"));
    }

    #[test]
    fn test_find_compaction_event() {
        let mut marker = Event::new("inv", "agent");
        marker.actions.compaction = Some(EventCompaction {
            start_timestamp: 1,
            end_timestamp: 2,
            compacted_content: Content::model_text("summary"),
        });
        let events = vec![text_event("agent", "a"), marker.clone(), text_event("agent", "b")];
        assert_eq!(find_compaction_event(&events).map(|e| &e.id), Some(&marker.id));
        assert!(find_compaction_event(&events[..1]).is_none());
    }

    #[test]
    fn test_code_execution_results() {
        let tool = |result: serde_json::Value| {
            Event::new("inv", "agent").with_content(Content {
                role: Role::Model,
                parts: vec![Part::function_response(FunctionResponse {
                    id: "f".to_string(),
                    name: "code_execution".to_string(),
                    response: result,
                })],
            })
        };
        let events = vec![
            tool(json!({ "result": "tool_code\nprint(2 + 2)" })),
            tool(json!({ "result": "4" })),
            tool(json!({ "result": "```" })),
            tool(json!({ "status": "ok" })),
            text_event("agent", "done"),
        ];
        assert_eq!(
            code_execution_results(&events),
            vec![
                CodeExecution::Code("\nprint(2 + 2)".to_string()),
                CodeExecution::Output("4".to_string()),
            ]
        );
    }
}
