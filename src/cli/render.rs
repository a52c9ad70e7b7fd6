//! Terminal rendering for sessions, messages and status lines.
//!
//! Everything returns a `String` so callers decide where it goes; colour is
//! controlled globally by `colored` (it honours `NO_COLOR`).

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::chat::model::{date_bucket, format_relative_time, ChatSession, ChatSettings, Message, Role};

/// Sessions grouped under their date bucket, in collection order.
pub fn session_list(sessions: &[ChatSession], current_id: Option<&str>, now: DateTime<Utc>) -> String {
    if sessions.is_empty() {
        return "No chat sessions yet.\nStart a new conversation!\n".to_string();
    }

    let mut groups: Vec<(String, Vec<&ChatSession>)> = Vec::new();
    for session in sessions {
        let bucket = date_bucket(session.updated_at, now);
        match groups.iter_mut().find(|(name, _)| *name == bucket) {
            Some((_, members)) => members.push(session),
            None => groups.push((bucket, vec![session])),
        }
    }

    let mut out = String::new();
    for (bucket, members) in groups {
        out.push_str(&format!("{}\n", bucket.dimmed()));
        for session in members {
            let marker = if current_id == Some(session.id.as_str()) { "*" } else { " " };
            let count = session.messages.len();
            out.push_str(&format!(
                " {} {}  {}  {}\n",
                marker,
                short_id(&session.id).yellow(),
                session.title.bold(),
                format!("{} message{}", count, if count == 1 { "" } else { "s" }).dimmed()
            ));
        }
    }
    out
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn message(message: &Message, now: DateTime<Utc>) -> String {
    let label: ColoredString = match message.role {
        Role::User => "You".blue().bold(),
        Role::Assistant => "AI".green().bold(),
    };
    let header = format!(
        "{} {}",
        label,
        format_relative_time(message.timestamp, now).dimmed()
    );

    let body = match message.role {
        Role::User => format!("{}\n", message.content),
        Role::Assistant => markdown(&message.content),
    };

    format!("{}\n{}", header, body)
}

pub fn conversation(session: &ChatSession, now: DateTime<Utc>) -> String {
    let mut out = format!("{}\n\n", session.title.bold().underline());
    for m in &session.messages {
        out.push_str(&message(m, now));
        out.push('\n');
    }
    out
}

pub fn thinking() -> String {
    "AI is thinking... (Ctrl-C to cancel)".dimmed().italic().to_string()
}

pub fn error_banner(error: &str) -> String {
    format!("{} {} {}", "Error:".red().bold(), error, "(/clear to dismiss)".dimmed())
}

pub fn settings(settings: &ChatSettings) -> String {
    let temperature = settings
        .temperature
        .map(|t| t.to_string())
        .unwrap_or_else(|| "provider default".to_string());
    format!(
        "{}\n{}\n\n{} {}\n{} {}\n",
        "System prompt".bold(),
        settings.system_prompt,
        "Model:".bold(),
        settings.model,
        "Temperature:".bold(),
        temperature
    )
}

#[derive(Default)]
struct MarkdownState {
    strong: bool,
    emphasis: bool,
    strikethrough: bool,
    heading: Option<HeadingLevel>,
    in_code_block: bool,
    lists: Vec<Option<u64>>,
}

impl MarkdownState {
    fn style(&self, text: &str) -> String {
        let mut styled = text.normal();
        if self.strong || self.heading.is_some() {
            styled = styled.bold();
        }
        if matches!(self.heading, Some(HeadingLevel::H1)) {
            styled = styled.underline();
        }
        if self.emphasis {
            styled = styled.italic();
        }
        if self.strikethrough {
            styled = styled.strikethrough();
        }
        styled.to_string()
    }
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Renders assistant markdown for a terminal: bold headings, emphasis,
/// bulleted and numbered lists, and framed code blocks labelled with their
/// language.
pub fn markdown(text: &str) -> String {
    let mut out = String::new();
    let mut state = MarkdownState::default();

    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    for event in Parser::new_ext(text, options) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { level, .. } => {
                    ensure_newline(&mut out);
                    state.heading = Some(level);
                }
                Tag::Strong => state.strong = true,
                Tag::Emphasis => state.emphasis = true,
                Tag::Strikethrough => state.strikethrough = true,
                Tag::CodeBlock(kind) => {
                    ensure_newline(&mut out);
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.is_empty() => lang.to_string(),
                        _ => "code".to_string(),
                    };
                    out.push_str(&format!("  ┌─ {}\n", lang).dimmed().to_string());
                    state.in_code_block = true;
                }
                Tag::List(start) => {
                    ensure_newline(&mut out);
                    state.lists.push(start);
                }
                Tag::Item => {
                    let depth = state.lists.len().saturating_sub(1);
                    let indent = "  ".repeat(depth);
                    let bullet = match state.lists.last_mut() {
                        Some(Some(n)) => {
                            let bullet = format!("{}.", n);
                            *n += 1;
                            bullet
                        }
                        _ => "•".to_string(),
                    };
                    out.push_str(&format!("{}  {} ", indent, bullet));
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Heading(_) => {
                    state.heading = None;
                    out.push_str("\n\n");
                }
                TagEnd::Strong => state.strong = false,
                TagEnd::Emphasis => state.emphasis = false,
                TagEnd::Strikethrough => state.strikethrough = false,
                TagEnd::CodeBlock => {
                    state.in_code_block = false;
                    out.push_str(&"  └─".dimmed().to_string());
                    out.push_str("\n\n");
                }
                TagEnd::Paragraph => out.push_str("\n\n"),
                TagEnd::Item => ensure_newline(&mut out),
                TagEnd::List(_) => {
                    state.lists.pop();
                    if state.lists.is_empty() {
                        out.push('\n');
                    }
                }
                TagEnd::TableCell => out.push_str(" | "),
                TagEnd::TableHead | TagEnd::TableRow => out.push('\n'),
                _ => {}
            },
            Event::Text(text) => {
                if state.in_code_block {
                    for line in text.lines() {
                        out.push_str(&format!("{} {}\n", "  │".dimmed(), line.cyan()));
                    }
                } else {
                    out.push_str(&state.style(&text));
                }
            }
            Event::Code(code) => out.push_str(&format!("`{}`", code).yellow().to_string()),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Rule => {
                ensure_newline(&mut out);
                out.push_str(&"────────".dimmed().to_string());
                out.push_str("\n\n");
            }
            Event::Html(html) => out.push_str(&html),
            _ => {}
        }
    }

    let mut rendered = out.trim_end().to_string();
    rendered.push('\n');
    rendered
}
