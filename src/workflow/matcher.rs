//! Skill matching used to pick an assignee for a triaged ticket.
//!
//! Skills are free text on both sides, so matching is heuristic: two skills
//! match when, ignoring case, one contains the other, or when a word of one
//! (at least three characters) is a substring of a word of the other.

const MIN_WORD_LEN: usize = 3;

/// Whether a candidate's skill covers a required skill.
pub fn skills_match(candidate: &str, required: &str) -> bool {
    let candidate = candidate.trim().to_lowercase();
    let required = required.trim().to_lowercase();
    if candidate.is_empty() || required.is_empty() {
        return false;
    }

    if candidate.contains(&required) || required.contains(&candidate) {
        return true;
    }

    let candidate_words = significant_words(&candidate);
    let required_words = significant_words(&required);
    candidate_words.iter().any(|cw| {
        required_words
            .iter()
            .any(|rw| cw.contains(rw) || rw.contains(cw))
    })
}

fn significant_words(phrase: &str) -> Vec<&str> {
    phrase
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .collect()
}

/// Number of required skills covered by at least one of the candidate's skills.
pub fn match_count(candidate_skills: &[String], required: &[String]) -> usize {
    required
        .iter()
        .filter(|req| candidate_skills.iter().any(|have| skills_match(have, req)))
        .count()
}

/// Picks the candidate covering the most required skills. A later candidate
/// only wins with a strictly higher count, so ties go to the first seen.
/// Returns `None` when nobody covers a single skill.
pub fn best_candidate<K: Clone>(candidates: &[(K, Vec<String>)], required: &[String]) -> Option<K> {
    if required.is_empty() {
        return None;
    }

    let mut best: Option<(&K, usize)> = None;
    for (key, skills) in candidates {
        let score = match_count(skills, required);
        tracing::debug!("Skill match score {} against {} required skills", score, required.len());
        if score == 0 {
            continue;
        }
        let better = match best {
            Some((_, top)) => score > top,
            None => true,
        };
        if better {
            best = Some((key, score));
        }
    }

    best.map(|(key, _)| key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skills(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_case_insensitive_containment() {
        assert!(skills_match("React", "react"));
        assert!(skills_match("react", "React Native"));
        assert!(skills_match("PostgreSQL administration", "postgresql"));
        assert!(!skills_match("Go", "Rust"));
    }

    #[test]
    fn test_word_overlap() {
        // "database" from one phrase is contained in "databases" of the other
        assert!(skills_match("SQL databases", "database tuning"));
        assert!(skills_match("network security", "security audits"));
        assert!(!skills_match("UI design", "billing system"));
    }

    #[test]
    fn test_short_words_ignored_for_overlap() {
        // "ui" and "ux" are too short to count as overlapping words
        assert!(!skills_match("ui work", "ux flow"));
        assert!(!skills_match("", "react"));
    }

    #[test]
    fn test_react_moderator_wins() {
        let candidates = vec![
            ("ops", skills(&["Kubernetes", "Billing"])),
            ("frontend", skills(&["React", "Node.js"])),
        ];
        assert_eq!(best_candidate(&candidates, &skills(&["react"])), Some("frontend"));
    }

    #[test]
    fn test_highest_count_wins() {
        let candidates = vec![
            ("a", skills(&["React"])),
            ("b", skills(&["React", "TypeScript", "CSS"])),
        ];
        let required = skills(&["react", "typescript"]);
        assert_eq!(best_candidate(&candidates, &required), Some("b"));
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let candidates = vec![
            ("first", skills(&["React"])),
            ("second", skills(&["react hooks"])),
        ];
        assert_eq!(best_candidate(&candidates, &skills(&["react"])), Some("first"));
    }

    #[test]
    fn test_no_match_or_no_required() {
        let candidates = vec![("a", skills(&["Go"]))];
        assert_eq!(best_candidate(&candidates, &skills(&["accounting"])), None);
        assert_eq!(best_candidate(&candidates, &[]), None);
        let empty: Vec<(&str, Vec<String>)> = Vec::new();
        assert_eq!(best_candidate(&empty, &skills(&["react"])), None);
    }

    #[test]
    fn test_required_skill_counted_once() {
        // several candidate skills covering the same requirement still count as one
        assert_eq!(match_count(&skills(&["React", "React Native"]), &skills(&["react"])), 1);
    }
}
