//! Terminal output formatting.

use std::time::Duration;

use aedris_engine::{CompilationStats, TargetStats};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    println!("{} {}", style("⚠").yellow().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", style("ℹ").blue().bold(), message);
}

/// Prints one target's outcome with its errors and warnings.
pub fn target_stats(stats: &TargetStats) {
    if stats.success {
        println!(
            "{} {} {}",
            style("✓").green(),
            stats.name,
            style(format!("({}ms)", stats.duration_ms)).dim()
        );
    } else {
        eprintln!("{} {}", style("✗").red(), style(&stats.name).red());
    }

    for error in &stats.errors {
        eprintln!("    {}", style(error).red());
    }
    for warning in &stats.warnings {
        println!("    {}", style(warning).yellow());
    }
}

/// Prints every target and a summary line.
pub fn compilation(stats: &CompilationStats) {
    for target in &stats.targets {
        target_stats(target);
    }

    let failed = stats.targets.iter().filter(|t| !t.success).count();
    println!();

    if failed > 0 {
        println!(
            "{}: {} compiled, {} failed in {}ms",
            style("FAILED").red().bold(),
            stats.targets.len() - failed,
            failed,
            stats.duration_ms
        );
    } else {
        println!(
            "{}: {} compiled in {}ms",
            style("SUCCESS").green().bold(),
            stats.targets.len(),
            stats.duration_ms
        );
    }
}

/// Creates a spinner for long-running operations.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Prints a header for a section.
pub fn section_header(title: &str) {
    println!("\n{}", style(format!("── {} ──", title)).bold());
}

/// Prints a key-value pair.
pub fn key_value(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Prints a list item.
pub fn list_item(text: &str) {
    println!("  {} {}", style("•").dim(), text);
}
