//! Terminal UI for LOTSAWA: progress bar and coloured output.
//!
//! Uses `indicatif` for the progress bar and `console` for styling.
//! [`RunProgress`] tracks a batched run in the terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::coordinator::RunSummary;
use crate::state_machine::WorkItem;

/// Progress indicator for a batched run.
///
/// Advances once per finished item and prints coloured lines for forced
/// accepts, failures and retries.
pub struct RunProgress {
    pb: ProgressBar,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Start the bar sized to the item count.
    pub fn start(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Show the current batch.
    pub fn batch(&self, number: usize, of: usize) {
        self.pb.set_message(format!("batch {number}/{of}"));
    }

    pub fn item_finished(&self, item: &WorkItem) {
        if item.forced() {
            self.pb.println(format!(
                "  {} Item {} force accepted after {} iterations",
                self.yellow.apply_to("!"),
                item.index(),
                item.content_iteration()
            ));
        }
        self.pb.inc(1);
    }

    pub fn item_failed(&self, index: usize, reason: &str) {
        self.pb
            .println(format!("  {} Item {index} failed: {reason}", self.red.apply_to("✗")));
        self.pb.inc(1);
    }

    /// Print a retry line with the attempt number and reason.
    pub fn retry(&self, scope: &str, attempt: u32, max: u32, reason: &str) {
        self.pb.println(format!(
            "  {} Retry {scope} {attempt}/{max}: {reason}",
            self.yellow.apply_to("↻")
        ));
    }

    /// Clear the bar and print the run summary.
    pub fn finish(&self, summary: &RunSummary) {
        self.pb.finish_and_clear();
        print_summary(summary);
    }
}

/// Print the coloured summary and the paths of both result logs.
pub fn print_summary(summary: &RunSummary) {
    let green = Style::new().green().bold();
    let yellow = Style::new().yellow().bold();
    let red = Style::new().red().bold();
    let heading = if summary.failed == 0 { &green } else { &yellow };

    println!();
    println!("{}", heading.apply_to("─── Run Summary ───"));
    println!("  Succeeded:       {}/{}", summary.succeeded(), summary.total);
    println!("  {} Accepted:      {}", green.apply_to("✓"), summary.accepted);
    println!("  {} Force accepted: {}", yellow.apply_to("!"), summary.force_accepted);
    println!("  {} Failed:        {}", red.apply_to("✗"), summary.failed);
    println!("  Successes: {}", summary.success_log);
    println!("  Failures:  {}", summary.failure_log);
}
