//! Terminal status lines. Everything goes to stderr so stdout stays free for
//! rows written with `--stdout`.

use std::fmt::Display;

use console::style;

pub fn success(message: impl Display) {
    eprintln!("{} {message}", style("✓").green().bold());
}

pub fn info(message: impl Display) {
    eprintln!("{} {message}", style("→").cyan());
}

pub fn warning(message: impl Display) {
    eprintln!("{} {message}", style("⚠").yellow().bold());
}

/// Print an error with its cause chain, one dimmed line per cause.
pub fn error(err: &anyhow::Error) {
    eprintln!("{} {err}", style("✗").red().bold());
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", style("→").dim(), style(cause).dim());
    }
}

pub fn detail(message: impl Display) {
    eprintln!("  {}", style(message).dim());
}
