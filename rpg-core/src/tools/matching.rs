//! Resolving free-text names from the agent to combatants.
//!
//! Precedence: exact (case-insensitive), then query-within-name, then fuzzy
//! similarity above a threshold, then the caller's single-candidate
//! fallback. Nothing past that is guessed.

use crate::combat::Combatant;

/// Pick the combatant a free-text `query` refers to.
pub fn resolve_target<'a>(
    candidates: &[&'a Combatant],
    query: &str,
    threshold: f64,
    fallback: Option<&'a Combatant>,
) -> Option<&'a Combatant> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return fallback;
    }

    if let Some(exact) = candidates
        .iter()
        .find(|c| c.name.to_lowercase() == query)
    {
        return Some(*exact);
    }

    let scored = |c: &&'a Combatant| (similarity(&query, &c.name.to_lowercase()), *c);

    // Among several names containing the query prefer the closest; ties keep order.
    let substring = candidates
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&query))
        .map(scored)
        .fold(None, best);
    if let Some((_, combatant)) = substring {
        return Some(combatant);
    }

    let fuzzy = candidates
        .iter()
        .map(scored)
        .filter(|(score, _)| *score > threshold)
        .fold(None, best);
    if let Some((score, combatant)) = fuzzy {
        tracing::debug!(query = %query, matched = %combatant.name, score, "fuzzy target match");
        return Some(combatant);
    }

    fallback
}

fn best<'a>(
    acc: Option<(f64, &'a Combatant)>,
    next: (f64, &'a Combatant),
) -> Option<(f64, &'a Combatant)> {
    match acc {
        Some((score, _)) if score >= next.0 => acc,
        _ => Some(next),
    }
}

/// Normalized Levenshtein similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
