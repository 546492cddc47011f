//! Argument parsing and command execution

use anyhow::Context;
use clap::Parser;
use std::future::Future;
use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use use_env_core::{
    ConfigError, ContentSource, EnvLoader, LoadError, LoadOptions, LoadResult, OutputLocation,
    OutputTarget, ProviderRegistry, UseEnvConfig, DEFAULT_CONCURRENCY,
};

use super::output;
use super::ExitCode;

/// Input file used when none is given and stdin is a terminal
pub const DEFAULT_INPUT: &str = ".env.dev";

/// Environment file processor with secret resolution
#[derive(Parser, Debug)]
#[command(name = "use-env")]
#[command(about = "Environment file processor with secret resolution", long_about = None)]
#[command(version)]
pub struct UseEnvCli {
    /// Input environment file (default: .env.dev, or stdin if piped; `-` reads stdin)
    pub input: Option<String>,

    /// Output file path (default: <input_dir>/.env, or stdout if piped; `-` writes stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Fail on any resolution error
    #[arg(long)]
    pub strict: bool,

    /// Configuration file path
    #[arg(long, env = "USE_ENV_CONFIG")]
    pub config: Option<PathBuf>,

    /// List all available providers
    #[arg(long)]
    pub list_providers: bool,

    /// Maximum number of references resolved concurrently
    /// (default: `options.concurrency` from the config file, else 8)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Where input is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    Stdin,
    File(PathBuf),
}

/// Input and output decided from arguments and terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub input: InputSpec,
    pub output: OutputTarget,
}

impl Plan {
    /// Decide input and output
    ///
    /// Without an input argument stdin is read when it is piped. Without an
    /// output argument the result goes to stdout when stdout is piped or the
    /// input came from stdin, otherwise to `.env` next to the input.
    pub fn new(cli: &UseEnvCli, stdin_is_terminal: bool, stdout_is_terminal: bool) -> Self {
        let input = match cli.input.as_deref() {
            Some("-") => InputSpec::Stdin,
            Some(path) => InputSpec::File(PathBuf::from(path)),
            None if !stdin_is_terminal => InputSpec::Stdin,
            None => InputSpec::File(PathBuf::from(DEFAULT_INPUT)),
        };

        let output = match cli.output.as_deref() {
            Some("-") => OutputTarget::Caller,
            Some(path) => OutputTarget::Path(PathBuf::from(path)),
            None if !stdout_is_terminal || input == InputSpec::Stdin => OutputTarget::Caller,
            None => OutputTarget::Default,
        };

        Self { input, output }
    }
}

/// Concurrency bound: the flag, then `options.concurrency`, then the default
pub fn effective_concurrency(flag: Option<usize>, config: &UseEnvConfig) -> Result<usize, ConfigError> {
    match flag {
        Some(n) => Ok(n),
        None => Ok(config.concurrency()?.unwrap_or(DEFAULT_CONCURRENCY)),
    }
}

/// Execute the parsed command line
///
/// Resolution stops early when `shutdown` completes.
pub async fn execute<F>(cli: UseEnvCli, shutdown: F) -> ExitCode
where
    F: Future<Output = ()>,
{
    let registry = match ProviderRegistry::with_builtin_providers() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            output::print_error(&e);
            return ExitCode::LoadError;
        }
    };

    if cli.list_providers {
        output::print_providers(&registry.list());
        return ExitCode::Success;
    }

    let config = match UseEnvConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&e);
            return ExitCode::InvalidInput;
        }
    };

    let concurrency = match effective_concurrency(cli.concurrency, &config) {
        Ok(concurrency) => concurrency,
        Err(e) => {
            output::print_error(&e);
            return ExitCode::InvalidInput;
        }
    };

    let plan = Plan::new(&cli, std::io::stdin().is_terminal(), std::io::stdout().is_terminal());
    let options = LoadOptions::default()
        .with_strict(cli.strict)
        .with_concurrency(concurrency);
    let loader = EnvLoader::new(registry, config);

    match process(&loader, plan, options, shutdown).await {
        Ok(result) => report(&result),
        Err(e) if matches!(e.downcast_ref::<LoadError>(), Some(LoadError::Cancelled)) => {
            output::print_cancelled();
            ExitCode::Interrupted
        }
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            match e.downcast_ref::<LoadError>() {
                Some(load_error) if load_error.is_user_error() => ExitCode::InvalidInput,
                _ => ExitCode::LoadError,
            }
        }
    }
}

async fn process<F>(loader: &EnvLoader, plan: Plan, options: LoadOptions, shutdown: F) -> anyhow::Result<LoadResult>
where
    F: Future<Output = ()>,
{
    let source = match plan.input {
        InputSpec::Stdin => {
            tracing::info!("Input source: stdin");
            let content = tokio::task::spawn_blocking(|| {
                let mut content = String::new();
                std::io::stdin().read_to_string(&mut content).map(|_| content)
            })
            .await
            .context("stdin reader task failed")?
            .context("Failed to read stdin")?;
            ContentSource::Text(content)
        }
        InputSpec::File(path) => {
            tracing::info!(path = %path.display(), "Input source: file");
            ContentSource::Path(path)
        }
    };

    let result = loader.load_until(source, plan.output, options, shutdown).await?;

    if result.output == OutputLocation::Caller {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(result.content.as_bytes())
            .and_then(|_| stdout.flush())
            .context("Failed to write to stdout")?;
    }

    Ok(result)
}

fn report(result: &LoadResult) -> ExitCode {
    tracing::info!(
        output = %result.output,
        variables = result.variables_count,
        resolved = result.secrets_resolved,
        "Processed environment file"
    );

    for error in &result.errors {
        output::print_warning(&error.message, &error.key);
    }

    if let Some(path) = result.output.path() {
        output::print_written(path, result.secrets_resolved);
    }

    ExitCode::Success
}
