//! Status lines, banners and key/value output

use super::context::UiContext;
use console::{style, StyledObject};

/// Severity of a single status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Level {
    /// Prefix used in plain mode
    fn tag(self) -> StyledObject<&'static str> {
        match self {
            Level::Ok => style("[OK]").green(),
            Level::Warn => style("[WARN]").yellow(),
            Level::Fail => style("[FAIL]").red(),
            Level::Info => style("[INFO]").cyan(),
        }
    }

    fn log(self, message: String) {
        let _ = match self {
            Level::Ok => cliclack::log::success(message),
            Level::Warn => cliclack::log::warning(message),
            Level::Fail => cliclack::log::error(message),
            Level::Info => cliclack::log::info(message),
        };
    }
}

/// One status line; `detail` is dimmed in fancy mode
fn step(ctx: &UiContext, level: Level, message: &str, detail: Option<(&str, &str)>) {
    let fancy = ctx.use_fancy_output();
    let text = match detail {
        None => message.to_string(),
        Some((sep, detail)) if fancy => format!("{}{}{}", message, sep, style(detail).dim()),
        Some((sep, detail)) => format!("{}{}{}", message, sep, detail),
    };
    if fancy {
        level.log(text);
    } else {
        println!("  {} {}", level.tag(), text);
    }
}

/// Opening banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        let _ = cliclack::intro(style(title).cyan().bold());
    } else {
        println!("{}", style(title).cyan().bold());
    }
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        let _ = cliclack::outro(style(message).green().bold());
    } else {
        println!("{} {}", Level::Ok.tag(), message);
    }
}

pub fn outro_warn(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        let _ = cliclack::outro(style(message).yellow().bold());
    } else {
        println!("{} {}", Level::Warn.tag(), message);
    }
}

/// Boxed note in fancy mode, `title: message` otherwise
pub fn note(ctx: &UiContext, title: &str, message: &str) {
    if ctx.use_fancy_output() {
        let _ = cliclack::note(title, message);
    } else {
        println!("{}: {}", style(title).bold(), message);
    }
}

pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        let _ = cliclack::log::step(style(title).bold());
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    step(ctx, Level::Ok, message, None);
}

/// `message (detail)`
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    step(ctx, Level::Ok, message, Some((" ", &format!("({})", detail))));
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    step(ctx, Level::Warn, message, None);
}

/// `message - hint`
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    step(ctx, Level::Warn, message, Some((" - ", hint)));
}

pub fn step_error(ctx: &UiContext, message: &str) {
    step(ctx, Level::Fail, message, None);
}

/// `message: detail`
pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    step(ctx, Level::Fail, message, Some((": ", detail)));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    step(ctx, Level::Info, message, None);
}

/// Dimmed aside
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        let _ = cliclack::log::remark(message);
    } else {
        println!("  {}", style(message).dim());
    }
}

/// Aligned `key: value` line
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {:<16} {}", style(format!("{}:", key)).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}

/// `key: value`, green when `ok` and yellow otherwise
pub fn key_value_status(ctx: &UiContext, key: &str, value: &str, ok: bool) {
    let value = if ok {
        style(value).green()
    } else {
        style(value).yellow()
    };
    if ctx.use_fancy_output() {
        println!("  {:<16} {}", style(format!("{}:", key)).dim(), value);
    } else {
        let level = if ok { Level::Ok } else { Level::Warn };
        println!("  {} {}: {}", level.tag(), key, value);
    }
}

/// Human-readable byte count, e.g. `2.10 MB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
