//! Input normalization for statuses, kinds and conflict strategies.
//!
//! Three-tier resolution: exact match → synonym lookup → error with
//! the closest suggestion.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::model::{ItemKind, ItemStatus};
use crate::sync::ConflictStrategy;

// ── Valid value sets ─────────────────────────────────────────

pub static VALID_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["backlog", "open", "in_progress", "blocked", "closed", "deferred"]
        .into_iter()
        .collect()
});

pub static VALID_KINDS: LazyLock<HashSet<&str>> =
    LazyLock::new(|| ["feature", "epic", "task"].into_iter().collect());

// ── Synonym maps ─────────────────────────────────────────────

pub static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("done", "closed"),
        ("complete", "closed"),
        ("completed", "closed"),
        ("finished", "closed"),
        ("resolved", "closed"),
        ("wip", "in_progress"),
        ("in-progress", "in_progress"),
        ("working", "in_progress"),
        ("active", "in_progress"),
        ("started", "in_progress"),
        ("new", "open"),
        ("todo", "open"),
        ("pending", "open"),
        ("proposed", "backlog"),
        ("icebox", "backlog"),
        ("waiting", "blocked"),
        ("stuck", "blocked"),
        ("hold", "deferred"),
        ("later", "deferred"),
        ("postponed", "deferred"),
        ("removed", "deferred"),
    ]
    .into_iter()
    .collect()
});

pub static KIND_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("story", "feature"),
        ("user_story", "feature"),
        ("enhancement", "feature"),
        ("request", "feature"),
        ("initiative", "epic"),
        ("parent", "epic"),
        ("ticket", "task"),
        ("item", "task"),
        ("bug", "task"),
        ("chore", "task"),
    ]
    .into_iter()
    .collect()
});

/// Normalize a status string via exact match or synonym lookup.
///
/// # Errors
///
/// Returns `InvalidArgument` naming the input and the closest suggestion.
pub fn normalize_status(input: &str) -> Result<ItemStatus> {
    let lower = input.trim().to_lowercase();

    if VALID_STATUSES.contains(lower.as_str()) {
        return Ok(ItemStatus::from_canonical(&lower));
    }

    if let Some(&canonical) = STATUS_SYNONYMS.get(lower.as_str()) {
        return Ok(ItemStatus::from_canonical(canonical));
    }

    let suggestion = find_closest_match(&lower, &VALID_STATUSES, &STATUS_SYNONYMS);
    Err(Error::InvalidArgument(unknown_value("status", input, suggestion)))
}

/// Normalize a work item kind via exact match or synonym lookup.
///
/// # Errors
///
/// Returns `InvalidArgument` naming the input and the closest suggestion.
pub fn normalize_kind(input: &str) -> Result<ItemKind> {
    let lower = input.trim().to_lowercase().replace(' ', "_");

    if VALID_KINDS.contains(lower.as_str()) {
        return Ok(ItemKind::from_canonical(&lower));
    }

    if let Some(&canonical) = KIND_SYNONYMS.get(lower.as_str()) {
        return Ok(ItemKind::from_canonical(canonical));
    }

    let suggestion = find_closest_match(&lower, &VALID_KINDS, &KIND_SYNONYMS);
    Err(Error::InvalidArgument(unknown_value("kind", input, suggestion)))
}

/// Parse a conflict strategy name.
///
/// # Errors
///
/// Returns `InvalidArgument` for names outside `local|remote|newest|manual|merge`.
pub fn normalize_strategy(input: &str) -> Result<ConflictStrategy> {
    match input.trim().to_lowercase().as_str() {
        "local" | "ours" => Ok(ConflictStrategy::Local),
        "remote" | "theirs" => Ok(ConflictStrategy::Remote),
        "newest" | "newer" | "latest" => Ok(ConflictStrategy::Newest),
        "manual" => Ok(ConflictStrategy::Manual),
        "merge" => Ok(ConflictStrategy::Merge),
        _ => Err(Error::InvalidArgument(format!(
            "unknown conflict strategy '{input}'"
        ))),
    }
}

fn unknown_value(what: &str, input: &str, suggestion: Option<String>) -> String {
    match suggestion {
        Some(s) => format!("unknown {what} '{input}' (did you mean '{s}'?)"),
        None => format!("unknown {what} '{input}'"),
    }
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist > 3 {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, d)) => dist < d,
        };
        if better {
            // Synonyms resolve to what they map to
            let shown = synonyms.get(v).copied().unwrap_or(v);
            best = Some((shown, dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Find existing IDs similar to the searched ID.
///
/// Returns up to `max` suggestions with edit distance ≤ 3,
/// sorted by distance then alphabetically.
#[must_use]
pub fn find_similar_ids(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|id| (levenshtein_distance(searched, id), id.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, id)| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status("open").unwrap(), ItemStatus::Open);
        assert_eq!(normalize_status("done").unwrap(), ItemStatus::Closed);
        assert_eq!(normalize_status("wip").unwrap(), ItemStatus::InProgress);
        assert_eq!(normalize_status("OPEN").unwrap(), ItemStatus::Open);
        assert!(normalize_status("nonsense").is_err());
    }

    #[test]
    fn test_normalize_status_suggests() {
        let err = normalize_status("blockd").unwrap_err();
        assert!(err.to_string().contains("did you mean 'blocked'"));
    }

    #[test]
    fn test_normalize_kind() {
        assert_eq!(normalize_kind("epic").unwrap(), ItemKind::Epic);
        assert_eq!(normalize_kind("story").unwrap(), ItemKind::Feature);
        assert_eq!(normalize_kind("User Story").unwrap(), ItemKind::Feature);
        assert_eq!(normalize_kind("bug").unwrap(), ItemKind::Task);
        assert!(normalize_kind("spaceship").is_err());
    }

    #[test]
    fn test_normalize_strategy() {
        assert_eq!(normalize_strategy("Newest").unwrap(), ConflictStrategy::Newest);
        assert_eq!(normalize_strategy("theirs").unwrap(), ConflictStrategy::Remote);
        assert!(normalize_strategy("coinflip").is_err());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar_ids() {
        let ids = vec![
            "wi_a1b2c3d4e5f6".to_string(),
            "wi_a1b2c3d4e5f7".to_string(),
            "wi_zzzzzzzzzzzz".to_string(),
        ];
        let result = find_similar_ids("wi_a1b2c3d4e5f0", &ids, 3);
        assert_eq!(result.len(), 2);
        assert!(!result.contains(&"wi_zzzzzzzzzzzz".to_string()));
    }
}
