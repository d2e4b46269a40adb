use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use std::time::Duration;

/// Sentinel shown wherever the ledger has no image.
pub const NONE: &str = "none";

const LABEL_WIDTH: usize = 16;

enum Stream {
    Stdout,
    Stderr,
}

fn emit(stream: Stream, marker: StyledObject<&str>, msg: impl Display) {
    match stream {
        Stream::Stdout => println!("{} {}", marker, msg),
        Stream::Stderr => eprintln!("{} {}", marker, msg),
    }
}

/// Spinner for waits on the fleet. Cleared by the caller once the wait ends.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());

    let pb = ProgressBar::new_spinner().with_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Numbered transition step, e.g. `[2/4] Launching app:b`.
pub fn step(num: usize, total: usize, msg: &str) {
    let counter = format!("[{}/{}]", num, total);
    println!("{} {}", style(counter).bold().cyan(), msg);
}

pub fn success(msg: &str) {
    emit(Stream::Stdout, style("✓").bold().green(), msg);
}

pub fn error(msg: &str) {
    emit(Stream::Stderr, style("✗").bold().red(), msg);
}

pub fn warning(msg: &str) {
    emit(Stream::Stderr, style("!").bold().yellow(), msg);
}

pub fn info(msg: &str) {
    emit(Stream::Stdout, style("→").bold().blue(), msg);
}

/// Failure attributed to one replica.
pub fn replica_error(replica: &str, msg: impl Display) {
    emit(
        Stream::Stderr,
        style("✗").bold().red(),
        format_args!("{} {}", style(replica).bold(), msg),
    );
}

pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Aligned `label value` line; a missing value prints [`NONE`].
pub fn field(label: &str, value: Option<&str>) {
    let value = match value {
        Some(v) => style(v.to_string()),
        None => style(NONE.to_string()).dim(),
    };
    println!("  {:<width$} {}", style(label).dim(), value, width = LABEL_WIDTH);
}

pub fn url(label: &str, url: &str) {
    emit(
        Stream::Stdout,
        style("↗").bold().blue(),
        format_args!("{} {}", label, style(url).underlined()),
    );
}
