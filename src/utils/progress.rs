//! Progress display for the per-paper processing loop.

use indicatif::{ProgressBar, ProgressStyle};

const TITLE_WIDTH: usize = 60;

/// Progress bar over the papers of one run
///
/// [`PaperProgress::hidden`] draws nothing and is used by library callers
/// and tests.
#[derive(Debug, Clone)]
pub struct PaperProgress {
    bar: ProgressBar,
}

impl PaperProgress {
    /// A visible bar on stderr
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg}\n{spinner:.cyan} {wide_bar:.cyan/blue} {pos}/{len} papers",
        ) {
            bar.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ").progress_chars("█▉ "));
        }
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Set the number of papers once it is known
    pub fn set_total(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    /// Show the title of the paper being processed
    pub fn start(&self, title: &str) {
        self.bar.set_message(truncate_title(title));
    }

    /// Mark the current paper as done
    pub fn advance(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= TITLE_WIDTH {
        return title.to_string();
    }
    let truncated: String = title.chars().take(TITLE_WIDTH - 3).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_title() {
        assert_eq!(truncate_title("Short"), "Short");
        let long = "x".repeat(80);
        let truncated = truncate_title(&long);
        assert_eq!(truncated.chars().count(), TITLE_WIDTH);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_hidden_progress_counts() {
        let progress = PaperProgress::hidden();
        progress.set_total(3);
        assert_eq!(progress.bar.length(), Some(3));
        progress.start("A paper");
        progress.advance();
        progress.advance();
        assert_eq!(progress.bar.position(), 2);
        progress.finish();
    }
}
