//! Console output
//!
//! Everything here goes to stderr except the provider listing, so resolved
//! content written to stdout is never mixed with messages.

use colored::Colorize;
use std::fmt::Display;
use std::path::Path;
use use_env_core::ProviderInfo;

pub fn print_error(error: &dyn Display) {
    eprintln!("{} {}", "Error:".red().bold(), error);
}

/// Lenient-mode diagnostic for one reference
pub fn print_warning(message: &str, key: &str) {
    eprintln!("{} {} (key: {})", "Warning:".yellow(), message, key);
}

pub fn print_written(path: &Path, secrets_resolved: usize) {
    eprintln!(
        "{}",
        format!("Wrote {} with {} secret(s) resolved.", path.display(), secrets_resolved).green()
    );
}

pub fn print_cancelled() {
    eprintln!("{}", "Cancelled.".yellow());
}

/// Render the provider table
pub fn format_providers(providers: &[ProviderInfo]) -> String {
    if providers.is_empty() {
        return "No providers registered.\n".to_string();
    }

    let name_width = providers.iter().map(|p| p.name.len()).max().unwrap_or(0).max(4);
    let version_width = providers.iter().map(|p| p.version.len()).max().unwrap_or(0).max(7);

    let mut table = format!(
        "{:<name_width$}  {:<version_width$}  {}\n",
        "Name",
        "Version",
        "Description",
        name_width = name_width,
        version_width = version_width
    );
    table.push_str(&format!("{}\n", "-".repeat(name_width + version_width + 4 + 11)));

    for provider in providers {
        table.push_str(&format!(
            "{:<name_width$}  {:<version_width$}  {}\n",
            provider.name,
            provider.version,
            provider.description,
            name_width = name_width,
            version_width = version_width
        ));
    }

    table
}

pub fn print_providers(providers: &[ProviderInfo]) {
    print!("{}", format_providers(providers));
}
