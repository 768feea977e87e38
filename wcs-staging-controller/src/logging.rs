use owo_colors::OwoColorize;
use std::sync::OnceLock;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;

static ANSI_ENABLED: OnceLock<bool> = OnceLock::new();

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let ansi = ansi_enabled();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}

pub fn category_access() -> String {
    category("ACCESS", |label| format!("{}", label.bright_cyan().bold()))
}

pub fn category_mode() -> String {
    category("MODE", |label| format!("{}", label.bright_green().bold()))
}

pub fn category_auth() -> String {
    category("AUTH", |label| format!("{}", label.bright_red().bold()))
}

pub fn category_store() -> String {
    category("STORE", |label| format!("{}", label.bright_magenta().bold()))
}

fn category(label: &str, paint: impl FnOnce(&str) -> String) -> String {
    if ansi_enabled() {
        paint(label)
    } else {
        label.to_string()
    }
}

/// Reads are blue, the form and mode posts green, url replacement yellow.
pub fn method_label(method: &str) -> String {
    category(method, |label| match label {
        "GET" | "HEAD" => format!("{}", label.bright_blue()),
        "POST" => format!("{}", label.bright_green()),
        "PUT" => format!("{}", label.bright_yellow()),
        _ => format!("{}", label.bright_white()),
    })
}

/// Redirects are the normal answer to an admin form post, so they share
/// the success color.
pub fn status_label(status: u16) -> String {
    category(&status.to_string(), |label| match status {
        200..=399 => format!("{}", label.bright_green()),
        400..=499 => format!("{}", label.bright_yellow()),
        _ => format!("{}", label.bright_red()),
    })
}

fn ansi_enabled() -> bool {
    *ANSI_ENABLED.get_or_init(detect_ansi)
}

fn detect_ansi() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    // The console switch must happen even when color is forced.
    let console_ready = enable_ansi_support().is_ok();
    std::env::var_os("FORCE_COLOR").is_some()
        || console_ready
        || supports_color::on_cached(Stream::Stdout).is_some()
}

#[cfg(windows)]
fn enable_ansi_support() -> windows::core::Result<()> {
    use windows::Win32::System::Console::{
        ENABLE_VIRTUAL_TERMINAL_PROCESSING, GetConsoleMode, GetStdHandle, STD_OUTPUT_HANDLE,
        SetConsoleMode,
    };

    // SAFETY: plain console mode queries on the process's own stdout handle.
    unsafe {
        let handle = GetStdHandle(STD_OUTPUT_HANDLE)?;
        let mut mode = std::mem::zeroed();
        GetConsoleMode(handle, &mut mode)?;
        SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING)
    }
}

#[cfg(not(windows))]
fn enable_ansi_support() -> Result<(), ()> {
    Err(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_keep_their_text_with_or_without_color() {
        assert!(method_label("POST").contains("POST"));
        assert!(status_label(303).contains("303"));
        assert!(category_mode().contains("MODE"));
    }
}
