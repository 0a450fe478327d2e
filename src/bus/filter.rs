//! Route key matching for topic subscriptions.

use super::TopicKind;

/// Whether a message with `route_key` reaches a subscription bound with
/// `filters` on a topic of the given kind. No filters means everything.
pub fn route_matches(kind: TopicKind, filters: &[String], route_key: Option<&str>) -> bool {
    if kind == TopicKind::Fanout || filters.is_empty() {
        return true;
    }
    let key = route_key.unwrap_or("");
    filters.iter().any(|filter| match kind {
        TopicKind::Direct => filter == key,
        TopicKind::Topic => topic_matches(filter, key),
        TopicKind::Pattern => glob_matches(filter, key),
        TopicKind::Fanout => true,
    })
}

/// AMQP topic matching: `*` matches one word, `#` zero or more words.
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if key.is_empty() { Vec::new() } else { key.split('.').collect() };
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((first, key_rest)) => (word == "*" || word == *first) && match_words(rest, key_rest),
            None => false,
        },
    }
}

/// Glob matching: `*` matches any run of characters, `?` exactly one.
pub fn glob_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
