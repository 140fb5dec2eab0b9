use indicatif::{ProgressBar, ProgressStyle};
use smdb_companion_core::{StatusChannel, StatusReporter, StatusUpdate};
use std::sync::Mutex;

const FINAL_STAGES: &[&str] = &["complete", "cancelled", "failed", "rolled_back"];

/// CLI progress reporter using an indicatif bar.
///
/// Top-level search and removal updates drive the bar; sub-status updates only
/// change its message.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar<F: FnOnce(&ProgressBar)>(&self, f: F) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        let pb = guard.get_or_insert_with(|| {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::with_template(
                "  {spinner:.cyan} [{bar:30.cyan/dim}] {pos:>3}% {msg}",
            ) {
                pb.set_style(style.progress_chars("━╸─").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
            }
            pb.enable_steady_tick(std::time::Duration::from_millis(80));
            pb
        });
        f(pb);
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl StatusReporter for CliReporter {
    fn on_status(&self, channel: StatusChannel, update: &StatusUpdate) {
        match channel {
            StatusChannel::SearchSub => self.with_bar(|pb| {
                pb.set_message(format!("{} ({}%)", update.message, update.progress));
            }),
            StatusChannel::Search | StatusChannel::Remove => {
                if FINAL_STAGES.contains(&update.stage.as_str()) {
                    self.finish_bar();
                    let mark = if update.stage == "complete" {
                        "\x1b[32m✓\x1b[0m"
                    } else {
                        "\x1b[31m✗\x1b[0m"
                    };
                    eprintln!("  {} {}", mark, update.message);
                } else {
                    self.with_bar(|pb| {
                        pb.set_position(update.progress as u64);
                        pb.set_message(update.message.clone());
                    });
                }
            }
        }
    }
}
