//! Spinners and download progress with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

enum Spinner {
    Idle,
    Live(cliclack::ProgressBar),
    /// Plain mode: the start line is already printed
    Plain,
}

/// Spinner for one long step, `... message` / `[OK] message` in plain mode
pub struct TaskSpinner {
    fancy: bool,
    state: Spinner,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            fancy: ctx.use_fancy_output(),
            state: Spinner::Idle,
        }
    }

    pub fn start(&mut self, message: &str) {
        self.state = if self.fancy {
            let spinner = cliclack::spinner();
            spinner.start(message);
            Spinner::Live(spinner)
        } else {
            println!("{} {}", style("...").dim(), message);
            Spinner::Plain
        };
    }

    pub fn stop(&mut self, message: &str) {
        self.finish(true, message);
    }

    pub fn stop_error(&mut self, message: &str) {
        self.finish(false, message);
    }

    fn finish(&mut self, ok: bool, message: &str) {
        match std::mem::replace(&mut self.state, Spinner::Idle) {
            Spinner::Live(spinner) if ok => spinner.stop(message),
            Spinner::Live(spinner) => spinner.error(message),
            Spinner::Idle | Spinner::Plain => {
                let mark = match (ok, self.fancy) {
                    (true, true) => style("✓").green(),
                    (false, true) => style("✗").red(),
                    (true, false) => style("[OK]").green(),
                    (false, false) => style("[FAIL]").red(),
                };
                println!("{} {}", mark, message);
            }
        }
    }
}

/// Progress bar for bulk downloads.
///
/// An indicatif bar in interactive mode; in CI each finished entry prints
/// one line with the running totals.
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
}

impl DownloadProgress {
    pub fn new(ctx: &UiContext, total: u64) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(total);
            let template = "  {spinner:.blue} Fetching  {bar:24.blue/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}";
            let style = ProgressStyle::default_bar()
                .template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .progress_chars("━╸─");
            bar.set_style(style);
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self { bar }
    }

    /// Record one finished entry
    pub fn on_done(&self, name: &str, ok: bool, position: &str) {
        match &self.bar {
            Some(bar) => {
                bar.inc(1);
                bar.set_message(shorten(name, 40));
                if !ok {
                    bar.println(format!("  {} {}", style("✗").red(), name));
                }
            }
            None => {
                let mark = if ok { style("[OK]").green() } else { style("[FAIL]").red() };
                println!("  {} [{}] {}", mark, position, name);
            }
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}
