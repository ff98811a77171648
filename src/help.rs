//! Renders usage banners, topic listings, and command help as two-column text,
//! wrapping the description column at the detected terminal width.
//!
//! Uses `console::Term::size()` for width detection — the same crate `indicatif`
//! uses internally for its own progress bar layout, promoted here to a direct
//! dependency since help output needs it independently of any progress bar.

use crate::plugins::{CommandRecord, TopicRecord};

const FALLBACK_WIDTH: usize = 80;
const MIN_DESCRIPTION_WIDTH: usize = 20;

fn terminal_width() -> usize {
    let (_, cols) = console::Term::stdout().size();
    if cols == 0 {
        FALLBACK_WIDTH
    } else {
        cols as usize
    }
}

/// Render two aligned columns: `label` left-padded to the longest label width, then
/// `description` word-wrapped into the remaining terminal width.
#[must_use]
pub fn render_columns(rows: &[(String, Option<String>)]) -> String {
    let label_width = rows.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);
    let wrap_width = terminal_width().saturating_sub(label_width + 4).max(MIN_DESCRIPTION_WIDTH);

    let mut out = String::new();
    for (label, description) in rows {
        let Some(description) = description else {
            out.push_str(&format!("  {label}\n"));
            continue;
        };

        let mut lines = wrap_text(description, wrap_width).into_iter();
        let first = lines.next().unwrap_or_default();
        out.push_str(&format!("  {label:<label_width$}  {first}\n"));
        for continuation in lines {
            out.push_str(&format!("  {:label_width$}  {continuation}\n", ""));
        }
    }
    out
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + word.chars().count() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Render the root usage banner: program name plus a sorted list of top-level topics.
#[must_use]
pub fn render_root(bin: &str, topics: &[TopicRecord]) -> String {
    let mut out = format!("Usage: {bin} <command> [<args>]\n\nTopics:\n");
    let rows: Vec<(String, Option<String>)> =
        topics.iter().map(|t| (t.name.clone(), t.description.clone())).collect();
    out.push_str(&render_columns(&rows));
    out
}

/// Render a topic's description and its direct commands.
#[must_use]
pub fn render_topic(topic: &TopicRecord, commands: &[CommandRecord]) -> String {
    let mut out = String::new();
    if let Some(description) = &topic.description {
        out.push_str(description);
        out.push_str("\n\n");
    }
    out.push_str(&format!("Commands in {}:\n", topic.name));
    let rows: Vec<(String, Option<String>)> =
        commands.iter().map(|c| (c.id.clone(), c.description.clone())).collect();
    out.push_str(&render_columns(&rows));
    out
}

/// Render a single command's own help, or a default rendering when it has none.
#[must_use]
pub fn render_command(command: &CommandRecord) -> String {
    match &command.description {
        Some(description) => format!("{}\n\n  {}\n", command.id, description),
        None => format!("{}\n\n  (no description provided)\n", command.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn render_columns_aligns_to_longest_label() {
        let rows = vec![
            ("a".to_string(), Some("short".to_string())),
            ("much-longer-label".to_string(), Some("also short".to_string())),
        ];
        let rendered = render_columns(&rows);
        let lines: Vec<&str> = rendered.lines().collect();
        let second_col_start = lines[0].find("short").unwrap();
        assert_eq!(lines[1].find("also").unwrap(), second_col_start);
    }

    #[test]
    fn render_root_lists_topic_names() {
        let topics = vec![TopicRecord {
            name: "plugins".to_string(),
            description: Some("Manage plugins".to_string()),
            hidden: false,
            commands: BTreeSet::new(),
        }];
        let rendered = render_root("kiln", &topics);
        assert!(rendered.contains("plugins"));
        assert!(rendered.contains("Manage plugins"));
    }

    #[test]
    fn wrap_text_never_exceeds_width_for_single_words_under_limit() {
        let lines = wrap_text("one two three four five six seven eight", 10);
        for line in &lines {
            assert!(line.chars().count() <= 10 || !line.contains(' '));
        }
    }
}
