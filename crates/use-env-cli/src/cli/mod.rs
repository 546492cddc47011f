//! Command-line interface for use-env

pub mod commands;
pub mod output;

pub use commands::UseEnvCli;

use tracing::Level;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// The file was processed
    Success = 0,
    /// Resolution or I/O failure
    LoadError = 1,
    /// Invalid input or configuration
    InvalidInput = 2,
    /// Interrupted by Ctrl-C
    Interrupted = 130,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Log level for a `-v` count
pub fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Run the CLI, returning the process exit code
///
/// Ctrl-C cancels the load; providers are closed before this returns.
pub async fn run(cli: UseEnvCli) -> ExitCode {
    commands::execute(cli, shutdown_signal()).await
}

/// Completes on Ctrl-C; never completes if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_conversion() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::LoadError), 1);
        assert_eq!(i32::from(ExitCode::InvalidInput), 2);
        assert_eq!(i32::from(ExitCode::Interrupted), 130);
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(1), Level::INFO);
        assert_eq!(log_level(2), Level::DEBUG);
        assert_eq!(log_level(7), Level::TRACE);
    }
}
