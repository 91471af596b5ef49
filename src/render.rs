//! Colored terminal rendering for calstore models using owo_colors.

use calstore_core::{FieldId, ModelTree, NodeId};
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for ModelTree {
    /// One line: `📅 alice/work (2 events)`.
    fn render(&self) -> String {
        let root = self.root();
        let events = self.children(root).count();
        let mut line = format!(
            "📅 {}/{}",
            text(self, root, FieldId::Owner).unwrap_or_default(),
            text(self, root, FieldId::Uri).unwrap_or_default().bold()
        );
        if let Some(name) = text(self, root, FieldId::DisplayName) {
            line.push_str(&format!(" {}", format!("\"{}\"", name).dimmed()));
        }
        line.push_str(&format!(
            " {}",
            format!("({} {})", events, pluralize("event", events)).dimmed()
        ));
        line
    }
}

/// Events of a calendar with their rules, one variation per indented line.
pub fn render_entries(tree: &ModelTree) -> String {
    let root = tree.root();
    let mut lines = Vec::new();

    for event in tree.children(root) {
        let start = tree
            .get(event, FieldId::Start)
            .ok()
            .and_then(|v| v.as_date())
            .map(|dt| format_start(&dt))
            .unwrap_or_else(|| "(no start)".to_string());
        let rule = text(tree, event, FieldId::Rrule).unwrap_or_else(|| "once".to_string());
        lines.push(format!(
            "   {} {} {}",
            text(tree, event, FieldId::Name).unwrap_or_default(),
            start.dimmed(),
            rule.cyan()
        ));

        for variation in tree.children(event) {
            lines.push(format!("      {} {}", "-".red(), render_variation(tree, variation)));
        }
    }

    if lines.is_empty() {
        return "   No events".dimmed().to_string();
    }
    lines.join("\n")
}

fn render_variation(tree: &ModelTree, variation: NodeId) -> String {
    let label = text(tree, variation, FieldId::Name)
        .or_else(|| text(tree, variation, FieldId::Identifier))
        .unwrap_or_default();
    let rule = match text(tree, variation, FieldId::Rrule) {
        Some(rule) if !rule.is_empty() => rule,
        _ => "(excludes nothing)".to_string(),
    };
    format!("{} {}", label, rule.red())
}

/// Occurrence list grouped under a heading.
pub fn render_occurrences(event: &str, occurrences: &[DateTime<Utc>]) -> String {
    if occurrences.is_empty() {
        return format!("{} {}", event.bold(), "has no occurrences in this window".dimmed());
    }

    let mut lines = vec![format!(
        "{} {}",
        event.bold(),
        format!(
            "({} {})",
            occurrences.len(),
            pluralize("occurrence", occurrences.len())
        )
        .dimmed()
    )];
    for at in occurrences {
        lines.push(format!("  {}", format_start(at)));
    }
    lines.join("\n")
}

fn format_start(dt: &DateTime<Utc>) -> String {
    dt.format("%a %Y-%m-%d %H:%M UTC").to_string()
}

fn text(tree: &ModelTree, node: NodeId, field: FieldId) -> Option<String> {
    tree.get_str(node, field).ok().flatten()
}

/// Simple pluralization helper
fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calstore_core::ModelContext;
    use chrono::TimeZone;

    #[test]
    fn calendar_line_counts_events() {
        let ctx = ModelContext::standard().unwrap();
        let mut tree = ModelTree::new_calendar(ctx, "alice", "work").unwrap();
        let root = tree.root();
        tree.add_event(
            root,
            "standup",
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            Some("FREQ=DAILY"),
        )
        .unwrap();

        let line = tree.render();
        assert!(line.contains("alice/"));
        assert!(line.contains("1 event)"));
    }

    #[test]
    fn empty_variation_rule_is_labelled() {
        let ctx = ModelContext::standard().unwrap();
        let mut tree = ModelTree::new_calendar(ctx, "alice", "work").unwrap();
        let root = tree.root();
        let event = tree
            .add_event(root, "standup", Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(), None)
            .unwrap();
        tree.add_variation(event, Some("holiday-week"), "").unwrap();

        let rendered = render_entries(&tree);
        assert!(rendered.contains("holiday-week"));
        assert!(rendered.contains("excludes nothing"));
        assert!(rendered.contains("once"));
    }

    #[test]
    fn pluralize_counts() {
        assert_eq!(pluralize("event", 1), "event");
        assert_eq!(pluralize("event", 0), "events");
    }
}
