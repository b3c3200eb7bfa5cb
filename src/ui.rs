use colored::{ColoredString, Colorize};
use stageflow::StageStatus;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Colored status label
pub fn status(status: StageStatus) -> ColoredString {
    match status {
        StageStatus::Succeeded => status.as_str().green(),
        StageStatus::Failed | StageStatus::CancellationFailed => status.as_str().red().bold(),
        StageStatus::Cancelled => status.as_str().yellow(),
        StageStatus::InProgress => status.as_str().cyan(),
        StageStatus::Queued => status.as_str().dimmed(),
    }
}

/// Print a flow tree, indented
pub fn tree(rendered: &str) {
    for line in rendered.lines() {
        println!("  {line}");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(status(StageStatus::Succeeded).to_string(), "SUCCEEDED");
        assert_eq!(status(StageStatus::CancellationFailed).to_string(), "CANCELLATION_FAILED");
    }
}
