// Command router
//
// Turns the free-form text of an inbound chat message into an Intent.
// Routing happens in two phases so a procedure can decide whether a message
// is addressed to it before paying for any project lookup:
//
// 1. `address` (needs only the message): empty text, bot mention, trigger word
// 2. `classify` (needs project context): list command, toolset selection
//
// `route` runs both phases in one call.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Word that addresses the bot in public channels
pub const TRIGGER_WORD: &str = "gram";

/// How many leading tokens may hold the trigger word
const TRIGGER_WINDOW: usize = 2;

/// Where a message was posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// One-to-one conversation with the bot
    Direct,
    /// Private multi-party conversation
    Group,
    /// Public channel; messages must carry the trigger word
    Public,
    /// The bot was mentioned explicitly
    Mention,
}

impl ChannelType {
    /// Whether messages need the trigger word to be addressed to the bot
    pub fn requires_trigger(self) -> bool {
        matches!(self, Self::Public)
    }

    /// Classify a Slack event by its `type` and `channel_type`
    pub fn from_slack(event_type: &str, channel_type: Option<&str>) -> Self {
        if event_type == "app_mention" {
            return Self::Mention;
        }

        match channel_type {
            Some("channel") if event_type == "message" => Self::Public,
            Some("im") => Self::Direct,
            _ => Self::Group,
        }
    }
}

/// Why a message produced no command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// The message had no text
    NoText,
    /// The message was only a bot mention
    MentionOnly,
    /// Public message without the trigger word
    NotAddressed,
    /// Nothing followed the trigger word
    NothingAfterTrigger,
    /// Nothing followed the toolset selector
    NothingAfterToolset,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoText => "no content found in prompt",
            Self::MentionOnly => "message only mentions the bot",
            Self::NotAddressed => "message is not addressed to the bot",
            Self::NothingAfterTrigger => "no content found in prompt after trigger word",
            Self::NothingAfterToolset => "no content found in prompt after toolset",
        };
        f.write_str(reason)
    }
}

/// Structured classification of an inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// List the project's toolsets
    ListToolsets,
    /// Run a chat completion over the prompt
    RunPrompt {
        toolset_slug: Option<String>,
        prompt: String,
    },
    /// Nothing to do; the message is ignored
    Empty { reason: EmptyReason },
}

impl Intent {
    fn empty(reason: EmptyReason) -> Self {
        Self::Empty { reason }
    }
}

/// The tokens of a message addressed to the bot, with mention and trigger removed
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Phase one: decide whether the message is addressed to the bot
pub fn address(
    text: &str,
    mention_user_id: Option<&str>,
    channel: ChannelType,
) -> Result<Command, EmptyReason> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(EmptyReason::NoText);
    }

    if let Some(user_id) = mention_user_id {
        let mention = format!("<@{user_id}>");
        if tokens[0].starts_with(&mention) {
            tokens.remove(0);
            if tokens.is_empty() {
                return Err(EmptyReason::MentionOnly);
            }
        }
    }

    if channel.requires_trigger() {
        let trigger = tokens
            .iter()
            .take(TRIGGER_WINDOW)
            .position(|token| token.eq_ignore_ascii_case(TRIGGER_WORD))
            .ok_or(EmptyReason::NotAddressed)?;

        tokens = tokens.split_off(trigger + 1);
        if tokens.is_empty() {
            return Err(EmptyReason::NothingAfterTrigger);
        }
    }

    Ok(Command {
        tokens: tokens.into_iter().map(str::to_string).collect(),
    })
}

/// Phase two: classify an addressed command against the project's toolsets
///
/// A leading `[slug]` or `(slug)` selects that toolset when the slug is
/// known. An unknown selector stays in the prompt as ordinary text and the
/// default toolset is used.
pub fn classify<S: AsRef<str>>(
    command: &Command,
    default_toolset: Option<&str>,
    known_toolsets: &[S],
) -> Intent {
    let tokens = command.tokens();

    if is_list_command(tokens) {
        return Intent::ListToolsets;
    }

    let selected = tokens
        .first()
        .and_then(|first| toolset_selector(first))
        .filter(|slug| known_toolsets.iter().any(|known| known.as_ref() == *slug));

    let (toolset_slug, prompt_tokens) = match selected {
        Some(slug) => (Some(slug.to_string()), &tokens[1..]),
        None => (default_toolset.map(str::to_string), tokens),
    };

    if prompt_tokens.is_empty() {
        return Intent::empty(EmptyReason::NothingAfterToolset);
    }

    Intent::RunPrompt {
        toolset_slug,
        prompt: prompt_tokens.join(" "),
    }
}

/// Route a message in one call
pub fn route<S: AsRef<str>>(
    text: &str,
    mention_user_id: Option<&str>,
    channel: ChannelType,
    default_toolset: Option<&str>,
    known_toolsets: &[S],
) -> Intent {
    match address(text, mention_user_id, channel) {
        Ok(command) => classify(&command, default_toolset, known_toolsets),
        Err(reason) => Intent::empty(reason),
    }
}

fn is_list_command(tokens: &[String]) -> bool {
    match tokens {
        [first] => first == "list",
        [first, second, ..] => first == "list" && (second == "tools" || second == "toolsets"),
        [] => false,
    }
}

fn toolset_selector(token: &str) -> Option<&str> {
    token
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .or_else(|| token.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')))
        .filter(|slug| !slug.is_empty())
}
