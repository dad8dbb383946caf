/// User-facing console output
///
/// Kept apart from tracing diagnostics: these lines are what a user reads
/// to know which repository and volumes a run touches.

use colored::Colorize;
use std::path::Path;

use crate::core::mounts::MountBinding;

pub fn repository(path: &Path) {
    println!("{} {}", "Repository:".bold(), path.display().to_string().cyan());
}

/// Volumes the child will see, shown relative to the backup root
pub fn volumes(container: &str, bindings: &[MountBinding], backup_root: &Path) {
    println!("\nRunning for {} with volumes:", container.bold());
    if bindings.is_empty() {
        println!("   {}", "(none)".dimmed());
    }
    for binding in bindings {
        let shown = Path::new(&binding.destination)
            .strip_prefix(backup_root)
            .map(|p| format!("/{}", p.display()))
            .unwrap_or_else(|_| binding.destination.clone());
        println!("   * {}", shown);
    }
    println!();
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn failure(message: &str) {
    println!("{} {}", "✗".red(), message);
}

/// A failed run on one line: the error followed by its causes
///
/// Causes already spelled out by an outer message are not repeated.
pub fn failure_message(err: &anyhow::Error) -> String {
    let mut message = err.to_string();
    for cause in err.chain().skip(1) {
        let cause = cause.to_string();
        if !message.contains(&cause) {
            message = format!("{}: {}", message, cause);
        }
    }
    message
}

pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}
