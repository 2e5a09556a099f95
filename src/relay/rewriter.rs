//! Mention Rewriter
//!
//! Turns mention tokens into inert plain text so relayed messages never
//! ping anyone in the target channel.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Placeholder used when a mentioned user cannot be resolved
pub const UNKNOWN_USER: &str = "UnknownUser";

static USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@!?(\d+)>").expect("user mention pattern is valid"));

static BROADCAST_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(everyone|here)").expect("broadcast mention pattern is valid"));

/// Rewrite mention tokens in `text`.
///
/// `<@id>` and `<@!id>` become `@Name` using `resolve`, or `@UnknownUser`
/// when it returns `None`. `@everyone` and `@here` lose their `@`.
pub fn rewrite<F>(text: &str, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let users = USER_MENTION.replace_all(text, |caps: &Captures| match resolve(&caps[1]) {
        Some(name) => format!("@{}", name),
        None => format!("@{}", UNKNOWN_USER),
    });

    BROADCAST_MENTION.replace_all(&users, "$1").into_owned()
}

/// Distinct user ids mentioned in `text`, in order of first appearance
pub fn mentioned_user_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in USER_MENTION.captures_iter(text) {
        let id = &caps[1];
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}
