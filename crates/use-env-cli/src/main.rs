//! use-env CLI
//!
//! Resolves secret references in an environment file and writes the result.
//!
//! # Usage
//!
//! ```bash
//! use-env .env.dev                    # Process .env.dev and write .env next to it
//! use-env .env.prod -o .env           # Write to a specific file
//! use-env .env.staging --strict       # Fail on any resolution error
//! use-env --list-providers            # List available providers
//! use-env --config .use-env.yaml      # Use a specific config file
//! cat .env.dev | use-env              # Pipe input, output to stdout
//! use-env .env.dev | grep DB_HOST     # Pipe output to another command
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Load failed (resolution or I/O error)
//! - 2: Invalid input or configuration
//! - 130: Interrupted

mod cli;

use clap::Parser;
use cli::UseEnvCli;

#[tokio::main]
async fn main() {
    let args = UseEnvCli::parse();

    // Logs go to stderr so piped output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(cli::log_level(args.verbose).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = cli::run(args).await;
    std::process::exit(exit_code.into());
}
