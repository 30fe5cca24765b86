// Colorized wrappers for logging

use colored::{ColoredString, Colorize};
use fern::Dispatch;

#[inline(always)]
pub fn format_log(message: &str) -> String {
    let now = chrono::Local::now().format("%Y.%m.%d %H:%M:%S").to_string();
    format!("[{now}] {message}")
}

#[doc(hidden)]
pub fn paint_error(message: &str) -> ColoredString {
    message.bright_red()
}

#[doc(hidden)]
pub fn paint_warning(message: &str) -> ColoredString {
    message.bright_yellow()
}

#[doc(hidden)]
pub fn paint_debug(message: &str) -> ColoredString {
    message.dimmed()
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {{
        let message = $crate::logging::format_log(&format!($($arg)*));
        ::log::error!("{}", $crate::logging::paint_error(&message));
    }}
}

#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {{
        let message = $crate::logging::format_log(&format!($($arg)*));
        ::log::info!("{message}");
    }}
}

#[macro_export]
macro_rules! print_debug {
    ($($arg:tt)*) => {{
        let message = $crate::logging::format_log(&format!($($arg)*));
        ::log::debug!("{}", $crate::logging::paint_debug(&message));
    }}
}

#[macro_export]
macro_rules! print_warning {
    ($($arg:tt)*) => {{
        let message = $crate::logging::format_log(&format!($($arg)*));
        ::log::warn!("{}", $crate::logging::paint_warning(&message));
    }}
}

/// Setup the logger.
pub fn setup(verbose: bool, no_color: bool) -> Result<(), log::SetLoggerError> {
    let log_level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    Dispatch::new()
        .level(log::LevelFilter::Error) // Hide enigo/notify logs
        .level_for("padmuxd", log_level)
        .chain(std::io::stdout())
        .apply()?;

    if no_color {
        colored::control::set_override(false);
    }
    Ok(())
}
