use crate::types::notify::{EventMetadata, NotificationKind};

use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RenderedTemplate {
    pub(crate) title: String,
    pub(crate) body: String,
}

const NEW_MESSAGE: &[(&str, &str)] = &[
    ("New message from {sender}", "{sender} wrote in \"{title}\"."),
    ("{sender} says something", "There is a new message waiting in \"{title}\"."),
    ("One new message", "{sender} just added to \"{title}\"."),
];

const MULTIPLE_MESSAGES: &[(&str, &str)] = &[
    ("{count} new messages", "{sender} sent {count} messages in \"{title}\"."),
    ("Catching up?", "\"{title}\" has {count} unread messages from {sender}."),
    ("{sender} is on a roll", "{count} new messages in \"{title}\"."),
];

const THREAD_REPLY: &[(&str, &str)] = &[
    ("{sender} replied", "New reply under \"{context}\" in \"{title}\"."),
    ("Thread update", "{sender} answered in \"{context}\"."),
];

const STATUS_CHANGE: &[(&str, &str)] = &[
    ("\"{title}\" changed", "{sender} set \"{title}\" to {status}."),
    ("Status update", "\"{title}\" is now {status}."),
];

const PINNED_ARGUMENT: &[(&str, &str)] = &[
    ("{sender} pinned an argument", "An argument was pinned in \"{title}\"."),
    ("Pinned for later", "{sender} pinned \"{context}\" in \"{title}\"."),
];

const REACTION: &[(&str, &str)] = &[
    ("{sender} reacted {emoji}", "{sender} reacted with {emoji} in \"{title}\"."),
    ("New reaction", "{emoji} from {sender} on \"{title}\"."),
];

fn pool_for(kind: NotificationKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        NotificationKind::NewMessage => NEW_MESSAGE,
        NotificationKind::MultipleMessages => MULTIPLE_MESSAGES,
        NotificationKind::ThreadReply => THREAD_REPLY,
        NotificationKind::StatusChange => STATUS_CHANGE,
        NotificationKind::PinnedArgument => PINNED_ARGUMENT,
        NotificationKind::Reaction => REACTION,
    }
}

/// Picks one variant from the kind's pool and substitutes placeholders.
/// `{count}` comes from the grouped message count; the remaining placeholders
/// come from event metadata and fall back to the empty string.
pub(crate) fn render_with_rng<R: Rng>(
    kind: NotificationKind,
    metadata: &EventMetadata,
    count: u32,
    rng: &mut R,
) -> RenderedTemplate {
    let pool = pool_for(kind);
    let (title, body) = pool[rng.gen_range(0..pool.len())];
    RenderedTemplate {
        title: substitute(title, metadata, count),
        body: substitute(body, metadata, count),
    }
}

const METADATA_PLACEHOLDERS: &[&str] = &["title", "sender", "emoji", "status", "context"];

fn substitute(template: &str, metadata: &EventMetadata, count: u32) -> String {
    let mut rendered = template.replace("{count}", &count.to_string());
    for key in METADATA_PLACEHOLDERS {
        let placeholder = format!("{{{key}}}");
        if rendered.contains(&placeholder) {
            let value = metadata.get(*key).map(String::as_str).unwrap_or("");
            rendered = rendered.replace(&placeholder, value);
        }
    }
    rendered
}
