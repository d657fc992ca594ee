//! Parse-with-fallback extraction of structured fields from model text.
//!
//! Generative models are asked to answer in a line format (`Field: value`,
//! numbered lists). Nothing here ever fails: a miss yields the
//! [`UNKNOWN`](crate::models::UNKNOWN) sentinel, an empty list, or whatever
//! items were recognised, so pipeline composition stays total.

use crate::models::{Priority, RecommendationItem, UNKNOWN};

const LIST_MARKERS: &[char] = &['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '.', '-', ')', ' '];

/// Value of the first line containing `field` (case-insensitive) with a
/// non-empty remainder after its first colon, stripped of whitespace and
/// square brackets.
fn field_value<'a>(text: &'a str, field: &str) -> Option<&'a str> {
    let needle = field.to_lowercase();
    text.lines()
        .filter(|line| line.to_lowercase().contains(&needle))
        .filter_map(|line| line.split_once(':'))
        .map(|(_, rest)| rest.trim().trim_matches(|c| c == '[' || c == ']').trim())
        .find(|value| !value.is_empty())
}

/// Extract a single labelled value, or `"unknown"` when absent.
pub fn extract_field(text: &str, field: &str) -> String {
    field_value(text, field).unwrap_or(UNKNOWN).to_string()
}

/// Extract a comma-separated labelled value as a list.
///
/// Segments are trimmed; empty segments are dropped.
pub fn extract_list(text: &str, field: &str) -> Vec<String> {
    field_value(text, field)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_list_line(line: &str) -> bool {
    line.starts_with(|c: char| c.is_ascii_digit()) || line.starts_with('-')
}

fn strip_marker(line: &str) -> &str {
    line.trim_start_matches(LIST_MARKERS)
}

/// Items of a numbered or dashed list, markers removed, at most `limit`.
pub fn parse_numbered_lines(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| is_list_line(line))
        .map(|line| strip_marker(line).trim().to_string())
        .filter(|item| !item.is_empty())
        .take(limit)
        .collect()
}

const RATIONALE: &str = "Rationale:";
const PRIORITY: &str = "Priority:";

/// Text after `label` if `line` carries it.
fn labelled<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.split_once(label).map(|(_, rest)| rest.trim())
}

/// Open a new item from a list line's content, lifting any inline
/// `Rationale:` / `Priority:` segments out of the recommendation text.
fn open_item(content: &str) -> RecommendationItem {
    let content = labelled(content, "Recommendation:").unwrap_or(content).trim();
    let cut = [RATIONALE, PRIORITY]
        .iter()
        .filter_map(|label| content.find(label))
        .min()
        .unwrap_or(content.len());

    if cut == content.len() {
        return RecommendationItem::new(content);
    }

    let head = content[..cut].trim_end_matches(|c: char| c.is_whitespace() || "(.,;-".contains(c));
    let mut item = RecommendationItem::new(head);
    let tail = &content[cut..];
    if let Some(rest) = labelled(tail, RATIONALE) {
        let end = rest.find(PRIORITY).unwrap_or(rest.len());
        item.rationale = rest[..end]
            .trim_end_matches(|c: char| c.is_whitespace() || "(.,;-)".contains(c))
            .to_string();
    }
    if let Some(rest) = labelled(tail, PRIORITY) {
        item.priority = Priority::parse_lenient(rest.trim_start_matches('('));
    }
    item
}

/// Parse a recommendation list of the shape
///
/// ```text
/// 1. Recommendation: walk 30 minutes a day
///    Rationale: improves insulin sensitivity
///    Priority: high
/// ```
///
/// A numbered line always opens a new item, flushing the previous one;
/// inline `Rationale:` / `Priority:` segments on it belong to that item.
/// A dashed line opens an item unless it is itself a `- Rationale:` or
/// `- Priority:` line. Bare `Rationale:` and `Priority:` lines amend the
/// open item and are ignored when no item is open. Priority defaults to
/// medium.
pub fn parse_recommendations(text: &str) -> Vec<RecommendationItem> {
    let mut items = Vec::new();
    let mut current: Option<RecommendationItem> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let body = strip_marker(line).trim();
        let amends = if line.starts_with(|c: char| c.is_ascii_digit()) {
            false
        } else if line.starts_with('-') {
            body.starts_with(RATIONALE) || body.starts_with(PRIORITY)
        } else {
            true
        };

        if amends {
            let Some(item) = current.as_mut() else { continue };
            if let Some(rationale) = labelled(body, RATIONALE) {
                item.rationale = rationale.to_string();
            } else if let Some(priority) = labelled(body, PRIORITY) {
                item.priority = Priority::parse_lenient(priority);
            }
        } else {
            if let Some(done) = current.take() {
                items.push(done);
            }
            current = Some(open_item(body));
        }
    }

    if let Some(done) = current {
        items.push(done);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = "1. Query Type: [symptoms]\n\
                            2. Disease Mentioned: Type 2 Diabetes\n\
                            3. Urgency Level: medium\n\
                            4. Key Entities: [blood sugar, fatigue, , thirst]\n\
                            5. Intent: understand early warning signs";

    #[test]
    fn test_extract_field() {
        assert_eq!(extract_field(ANALYSIS, "Query Type"), "symptoms");
        assert_eq!(extract_field(ANALYSIS, "disease mentioned"), "Type 2 Diabetes");
        assert_eq!(extract_field(ANALYSIS, "Intent"), "understand early warning signs");
    }

    #[test]
    fn test_extract_field_missing_is_unknown() {
        assert_eq!(extract_field(ANALYSIS, "Severity"), "unknown");
        assert_eq!(extract_field("", "Intent"), "unknown");
        assert_eq!(extract_field("Intent has no colon", "Intent"), "unknown");
    }

    #[test]
    fn test_extract_field_skips_empty_value() {
        let text = "Intent:\nIntent: compare drugs";
        assert_eq!(extract_field(text, "Intent"), "compare drugs");
    }

    #[test]
    fn test_extract_field_keeps_later_colons() {
        assert_eq!(extract_field("Intent: ratio 3:1", "Intent"), "ratio 3:1");
    }

    #[test]
    fn test_extract_list() {
        assert_eq!(
            extract_list(ANALYSIS, "Key Entities"),
            vec!["blood sugar", "fatigue", "thirst"]
        );
        assert!(extract_list(ANALYSIS, "Medications").is_empty());
    }

    #[test]
    fn test_parse_numbered_lines_caps_and_strips() {
        let text = "Here are some questions:\n\
                    1. What is HbA1c?\n\
                    2) How often should I test?\n\
                    - Can diet reverse it?\n\
                    4. Is it hereditary?";
        assert_eq!(
            parse_numbered_lines(text, 3),
            vec![
                "What is HbA1c?",
                "How often should I test?",
                "Can diet reverse it?"
            ]
        );
    }

    #[test]
    fn test_parse_numbered_lines_on_error_text() {
        assert!(parse_numbered_lines("[Error: 503]", 3).is_empty());
    }

    #[test]
    fn test_parse_recommendations() {
        let text = "Based on the profile:\n\
                    1. Recommendation: Walk 30 minutes daily\n\
                    \x20  Rationale: Improves insulin sensitivity\n\
                    \x20  Priority: High\n\
                    2. Reduce sodium intake\n\
                    \x20  Priority: low\n\
                    3. Recommendation: Track glucose weekly\n\
                    \x20  Rationale: Early detection of drift";
        let items = parse_recommendations(text);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].recommendation, "Walk 30 minutes daily");
        assert_eq!(items[0].rationale, "Improves insulin sensitivity");
        assert_eq!(items[0].priority, Priority::High);
        assert_eq!(items[1].recommendation, "Reduce sodium intake");
        assert_eq!(items[1].rationale, "");
        assert_eq!(items[1].priority, Priority::Low);
        assert_eq!(items[2].priority, Priority::Medium);
    }

    #[test]
    fn test_parse_recommendations_dashed_amendments() {
        let text = "- Recommendation: Sleep 7 hours\n- Rationale: Recovery\n- Priority: medium";
        let items = parse_recommendations(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].rationale, "Recovery");
    }

    #[test]
    fn test_parse_recommendations_orphan_amendments_ignored() {
        let items = parse_recommendations("Rationale: nothing open\nPriority: high");
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_recommendations_inline_labels_open_items() {
        let text = "1. Recommendation: Limit sodium (Priority: high)\n\
                    2. Recommendation: Walk daily. Rationale: helps insulin\n\
                    3. Recommendation: Sleep well";
        let items = parse_recommendations(text);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].recommendation, "Limit sodium");
        assert_eq!(items[0].priority, Priority::High);
        assert_eq!(items[1].recommendation, "Walk daily");
        assert_eq!(items[1].rationale, "helps insulin");
        assert_eq!(items[1].priority, Priority::Medium);
        assert_eq!(items[2].recommendation, "Sleep well");
    }

    #[test]
    fn test_parse_recommendations_inline_rationale_and_priority() {
        let items = parse_recommendations(
            "1. Check feet daily; Rationale: catches ulcers early; Priority: high",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].recommendation, "Check feet daily");
        assert_eq!(items[0].rationale, "catches ulcers early");
        assert_eq!(items[0].priority, Priority::High);
    }
}
