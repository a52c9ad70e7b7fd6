//! Conversation data model and the pure helpers around it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE};

pub const DEFAULT_TITLE: &str = "New Chat";

const TITLE_MAX_WORDS: usize = 6;
const TITLE_MAX_CHARS: usize = 50;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Speaker label used in transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_loading: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Plain-text transcript: the title, an `=` underline of the same
    /// length, then one `Speaker: content` block per message.
    pub fn transcript(&self) -> String {
        let body = self
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{}\n{}\n\n{}",
            self.title,
            "=".repeat(self.title.chars().count()),
            body
        )
    }
}

/// Missing fields in a stored record take their default rather than
/// discarding the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    pub system_prompt: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
        }
    }
}

/// Partial settings update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

impl ChatSettings {
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(system_prompt) = patch.system_prompt {
            self.system_prompt = system_prompt;
        }
        if let Some(model) = patch.model {
            self.model = model;
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = Some(temperature);
        }
    }
}

pub fn create_message(role: Role, content: impl Into<String>) -> Message {
    Message {
        id: Uuid::new_v4().to_string(),
        role,
        content: content.into(),
        timestamp: Utc::now(),
        is_loading: None,
    }
}

pub fn create_session(title: Option<&str>) -> ChatSession {
    let now = Utc::now();
    ChatSession {
        id: Uuid::new_v4().to_string(),
        title: title
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string(),
        messages: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Title derived from the first six words of a message, capped at 50
/// characters including the trailing ellipsis.
pub fn generate_title(first_message: &str) -> String {
    let title = first_message
        .split_whitespace()
        .take(TITLE_MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    if title.chars().count() > TITLE_MAX_CHARS {
        let keep = TITLE_MAX_CHARS - ELLIPSIS.len();
        let mut truncated: String = title.chars().take(keep).collect();
        truncated.push_str(ELLIPSIS);
        return truncated;
    }

    title
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{} {} ago", n, unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let minutes = elapsed.num_minutes();
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        plural(days, "day")
    } else if hours > 0 {
        plural(hours, "hour")
    } else if minutes > 0 {
        plural(minutes, "minute")
    } else {
        "just now".to_string()
    }
}

/// Calendar bucket used to group the session list.
pub fn date_bucket(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = now
        .date_naive()
        .signed_duration_since(timestamp.date_naive())
        .num_days();

    match days {
        d if d <= 0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        d if d < 7 => format!("{} days ago", d),
        _ => timestamp.format("%Y-%m-%d").to_string(),
    }
}

/// Dated export with one `[timestamp] Speaker:` header per message.
pub fn export_as_text(session: &ChatSession) -> String {
    let mut export = String::new();
    export.push_str(&format!("Chat: {}\n", session.title));
    export.push_str(&format!("Created: {}\n\n", session.created_at.format("%Y-%m-%d")));

    let messages = session
        .messages
        .iter()
        .map(|m| {
            format!(
                "[{}] {}:\n{}\n",
                m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                m.role.label(),
                m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    export.push_str(&messages);
    export
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_generate_title_takes_six_words() {
        assert_eq!(
            generate_title("how do I write a linked list in rust"),
            "how do I write a linked"
        );
        assert_eq!(generate_title("  spaced   out\tinput  "), "spaced out input");
    }

    #[test]
    fn test_generate_title_truncates_to_fifty_chars() {
        let title = generate_title("Supercalifragilisticexpialidocious antidisestablishmentarianism pneumonoultramicroscopic");
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
        assert!(title.starts_with("Supercalifragilisticexpialidocious antidisestab"));
    }

    #[test]
    fn test_generate_title_counts_characters_not_bytes() {
        let words = "ééééééééééé ééééééééééé ééééééééééé ééééééééééé ééééééééééé";
        let title = generate_title(words);
        assert_eq!(title.chars().count(), 50);
    }

    #[test]
    fn test_generate_title_placeholder_for_blank() {
        assert_eq!(generate_title(""), DEFAULT_TITLE);
        assert_eq!(generate_title("   \n\t "), DEFAULT_TITLE);
    }

    #[test]
    fn test_generate_title_bound_holds_for_many_inputs() {
        let long = "x".repeat(120);
        let inputs = [
            "a",
            "one two three four five six seven",
            long.as_str(),
            "short words only here",
            "mixed 🚀 emoji 🚀 content 🚀 that 🚀 runs 🚀 long",
        ];
        for input in inputs {
            let title = generate_title(input);
            assert!(!title.is_empty());
            assert!(title.chars().count() <= 50);
            let joined = input.split_whitespace().take(6).collect::<Vec<_>>().join(" ");
            if joined.chars().count() <= 50 {
                assert_eq!(title, joined);
            }
        }
    }

    #[test]
    fn test_format_relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(format_relative_time(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(format_relative_time(now - Duration::hours(23), now), "23 hours ago");
        assert_eq!(format_relative_time(now - Duration::days(1), now), "1 day ago");
        assert_eq!(format_relative_time(now - Duration::days(40), now), "40 days ago");
        assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
    }

    #[test]
    fn test_date_bucket() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(date_bucket(now - Duration::hours(2), now), "Today");
        assert_eq!(date_bucket(now - Duration::days(1), now), "Yesterday");
        assert_eq!(date_bucket(now - Duration::days(3), now), "3 days ago");
        assert_eq!(date_bucket(now - Duration::days(30), now), "2024-04-10");
    }

    #[test]
    fn test_create_session_defaults() {
        let session = create_session(None);
        assert_eq!(session.title, DEFAULT_TITLE);
        assert!(session.messages.is_empty());
        assert_eq!(session.created_at, session.updated_at);

        let named = create_session(Some("Planning"));
        assert_eq!(named.title, "Planning");
        assert_ne!(named.id, session.id);
    }

    #[test]
    fn test_create_message_keeps_content_verbatim() {
        let message = create_message(Role::User, "  <b>raw</b>  ");
        assert_eq!(message.content, "  <b>raw</b>  ");
        assert_eq!(message.role, Role::User);
        assert!(message.is_loading.is_none());
    }

    #[test]
    fn test_settings_merge_is_shallow() {
        let mut settings = ChatSettings::default();
        settings.merge(SettingsPatch {
            model: Some("other/model".to_string()),
            ..Default::default()
        });
        assert_eq!(settings.model, "other/model");
        assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(settings.temperature, Some(DEFAULT_TEMPERATURE));
    }

    #[test]
    fn test_transcript_format() {
        let mut session = create_session(Some("Greetings"));
        session.push_message(create_message(Role::User, "Hi"));
        session.push_message(create_message(Role::Assistant, "Hello!"));
        assert_eq!(
            session.transcript(),
            "Greetings\n=========\n\nYou: Hi\n\nAssistant: Hello!"
        );
    }

    #[test]
    fn test_export_as_text_has_header_and_entries() {
        let mut session = create_session(Some("Export me"));
        session.push_message(create_message(Role::User, "question"));
        let text = export_as_text(&session);
        assert!(text.starts_with("Chat: Export me\nCreated: "));
        assert!(text.contains("] You:\nquestion\n"));
    }

    #[test]
    fn test_message_json_uses_camel_case() {
        let session = create_session(None);
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());

        let settings = serde_json::to_value(ChatSettings::default()).unwrap();
        assert!(settings.get("systemPrompt").is_some());
    }
}
