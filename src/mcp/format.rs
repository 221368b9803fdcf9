use crate::shared::utils::{short_id, truncate_chars};
use crate::shared::{FileHit, Message, MessageHit, PruneReport, Stats, SyncReport};

const PREVIEW_CHARS: usize = 400;

fn message_line(message: &Message) -> String {
    let mut line = format!(
        "**[{}]** `{}` {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        short_id(&message.id),
        message.role
    );
    if !message.tags.is_empty() {
        line.push_str(&format!(" ({})", message.tags.join(", ")));
    }
    line.push('\n');
    line.push_str(&truncate_chars(&message.content, PREVIEW_CHARS));
    line.push('\n');
    if let Some(summary) = &message.summary {
        line.push_str(&format!("_Summary_: {summary}\n"));
    }
    line
}

pub fn format_messages(title: &str, messages: &[Message]) -> String {
    if messages.is_empty() {
        return format!("# {title}\n\nNo messages.\n");
    }

    let mut output = format!("# {title} ({} messages)\n\n", messages.len());
    for message in messages {
        output.push_str(&message_line(message));
        output.push_str(&format!("id: {}\n\n", message.id));
    }
    output
}

pub fn format_message_hits(query: &str, hits: &[MessageHit]) -> String {
    if hits.is_empty() {
        return format!("No messages found for '{query}'.\n");
    }

    let mut output = format!("# Results for '{query}'\n\n");
    for hit in hits {
        output.push_str(&format!("**Score**: {:.3}\n", hit.score));
        output.push_str(&message_line(&hit.message));
        output.push_str(&format!("id: {}\n\n", hit.message.id));
    }
    output
}

pub fn format_file_hits(query: &str, hits: &[FileHit]) -> String {
    if hits.is_empty() {
        return format!("No project files found for '{query}'.\n");
    }

    let mut output = format!("# Files matching '{query}'\n\n");
    for hit in hits {
        output.push_str(&format!(
            "## {} ({}, score {:.3})\n",
            hit.path, hit.language, hit.score
        ));
        output.push_str(&format!("**Project**: {}\n", hit.project));
        if let Some(tag) = &hit.tag {
            output.push_str(&format!("**Tag**: {tag}\n"));
        }
        output.push_str("```\n");
        output.push_str(&hit.snippet);
        output.push_str("\n```\n\n");
    }
    output
}

pub fn format_sync_report(report: &SyncReport) -> String {
    let mut output = format!("# Sync of {}\n\n", report.project);
    output.push_str(&format!("**Status**: {:?}\n", report.status));
    output.push_str(&format!("**Scanned**: {}\n", report.scanned));
    output.push_str(&format!("**New**: {}\n", report.new));
    output.push_str(&format!("**Updated**: {}\n", report.updated));
    output.push_str(&format!("**Unchanged**: {}\n", report.unchanged));
    output.push_str(&format!("**Skipped**: {}\n", report.skipped));
    output.push_str(&format!("**Succeeded**: {}\n", report.succeeded));
    output.push_str(&format!("**Failed**: {}\n", report.failed));

    if !report.failures.is_empty() {
        output.push_str("\n## Errors\n");
        for failure in &report.failures {
            output.push_str(&format!("- {}: {}\n", failure.path, failure.reason));
        }
    }
    if !report.missing.is_empty() {
        output.push_str(&format!(
            "\n{} recorded files are no longer on disk; run prune_missing_project_files to remove them.\n",
            report.missing.len()
        ));
    }
    output
}

pub fn format_prune_report(report: &PruneReport) -> String {
    if report.removed.is_empty() {
        return format!("Nothing to prune in {}.\n", report.project);
    }
    let mut output = format!(
        "Pruned {} files from {}:\n",
        report.removed.len(),
        report.project
    );
    for path in &report.removed {
        output.push_str(&format!("- {path}\n"));
    }
    output
}

pub fn format_stats(stats: &Stats) -> String {
    let mut output = String::from("# Memory Statistics\n\n");
    output.push_str(&format!("**Messages**: {}\n", stats.messages));
    output.push_str(&format!("**Project Files**: {}\n", stats.project_files));
    output.push_str(&format!(
        "**Buffered**: {}/{}\n",
        stats.buffered, stats.threshold
    ));
    output.push_str(&format!("**Tagging Mode**: {}\n", stats.mode));
    if stats.current_tag.is_empty() {
        output.push_str("**Conversation Tag**: (none)\n");
    } else {
        output.push_str(&format!("**Conversation Tag**: {}\n", stats.current_tag));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{Role, SyncStatus, TaggingMode};

    #[test]
    fn test_format_messages_shows_tags_and_ids() {
        let mut message = Message::new(Role::User, "hello there");
        message.add_tag("category:question");
        let text = format_messages("History", std::slice::from_ref(&message));

        assert!(text.contains("History (1 messages)"));
        assert!(text.contains("category:question"));
        assert!(text.contains(&message.id));
    }

    #[test]
    fn test_format_sync_report_lists_errors() {
        let report = SyncReport {
            project: "/tmp/p".to_string(),
            status: SyncStatus::Partial,
            scanned: 2,
            new: 2,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            succeeded: 1,
            failed: 1,
            failures: vec![crate::shared::FileFailure {
                path: "b.txt".to_string(),
                reason: "timeout".to_string(),
            }],
            missing: vec![],
        };
        let text = format_sync_report(&report);
        assert!(text.contains("**Status**: Partial"));
        assert!(text.contains("- b.txt: timeout"));
    }

    #[test]
    fn test_format_stats_without_tag() {
        let stats = Stats {
            messages: 3,
            project_files: 7,
            buffered: 1,
            threshold: 5,
            mode: TaggingMode::Manual,
            current_tag: String::new(),
        };
        let text = format_stats(&stats);
        assert!(text.contains("**Buffered**: 1/5"));
        assert!(text.contains("**Tagging Mode**: manual"));
        assert!(text.contains("(none)"));
    }
}
