//! Wildcard pattern matching for message keys.
//!
//! Two kinds of matching exist. Broadcast delivery ([`matches`]) compiles the
//! whole pattern into an anchored, case-insensitive regex in which the
//! wildcard becomes `.*` and the level wildcard becomes "anything but the
//! separator". Availability ([`can_fire`]) is looser and works level by
//! level, so that a listener on `a.*` is initialised as soon as `a.b` gets a
//! broadcaster.

use regex::{Regex, RegexBuilder};

use crate::config::MediatorConfig;

/// Compiles `pattern` for broadcast matching. Returns `None` if the resulting
/// regex cannot be built, in which case the pattern never matches.
pub fn compile(pattern: &str, config: &MediatorConfig) -> Option<Regex> {
    let level = format!("[^{}]*", regex::escape(&config.separator));
    let (first, first_source, second, second_source) =
        if config.wildcard.len() >= config.level_wildcard.len() {
            (config.wildcard.as_str(), ".*", config.level_wildcard.as_str(), level.as_str())
        } else {
            (config.level_wildcard.as_str(), level.as_str(), config.wildcard.as_str(), ".*")
        };

    let mut source = String::from("^");
    let mut literal = String::new();
    let mut rest = pattern;
    while let Some(ch) = rest.chars().next() {
        let token = if rest.starts_with(first) {
            Some((first, first_source))
        } else if rest.starts_with(second) {
            Some((second, second_source))
        } else {
            None
        };
        match token {
            Some((token, token_source)) => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(token_source);
                rest = &rest[token.len()..];
            }
            None => {
                literal.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');
    RegexBuilder::new(&source).case_insensitive(true).build().ok()
}

/// Whether a broadcast of `message` reaches listeners of `pattern`.
pub fn matches(pattern: &str, message: &str, config: &MediatorConfig) -> bool {
    compile(pattern, config).is_some_and(|re| re.is_match(message))
}

/// Whether a broadcaster registered for `message` makes a listener on
/// `pattern` available.
///
/// Pattern levels after the first wildcard are ignored and the level holding
/// it only has to match as a prefix. The level wildcard matches anything
/// within its level, as do missing or empty pattern levels.
pub fn can_fire(pattern: &str, message: &str, config: &MediatorConfig) -> bool {
    let (head, truncated) = match pattern.find(config.wildcard.as_str()) {
        Some(index) => (&pattern[..index], true),
        None => (pattern, false),
    };
    let levels: Vec<&str> = head.split(config.separator.as_str()).collect();
    let last = levels.len().saturating_sub(1);
    message
        .split(config.separator.as_str())
        .enumerate()
        .all(|(index, part)| match levels.get(index) {
            None => true,
            Some(level) if level.is_empty() => true,
            Some(level) => level_matches(level, part, truncated && index == last, config),
        })
}

fn level_matches(level: &str, part: &str, prefix: bool, config: &MediatorConfig) -> bool {
    let mut source = String::from("^");
    for (index, literal) in level.split(config.level_wildcard.as_str()).enumerate() {
        if index > 0 {
            source.push_str(".*");
        }
        source.push_str(&regex::escape(literal));
    }
    if !prefix {
        source.push('$');
    }
    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .is_ok_and(|re| re.is_match(part))
}

/// Whether unregistering `key` covers the available `message`: equal, or a
/// descendant of it in the hierarchy. Case-insensitive.
pub(crate) fn covers(key: &str, message: &str, separator: &str) -> bool {
    let key = key.to_lowercase();
    let message = message.to_lowercase();
    match message.strip_prefix(key.as_str()) {
        Some("") => true,
        Some(rest) => rest.starts_with(separator),
        None => false,
    }
}
