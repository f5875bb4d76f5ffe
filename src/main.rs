use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use action_engine::action::{ActionRegistry, Status};
use action_engine::builtin;
use action_engine::config::Config;
use action_engine::hooks::LifecycleHooks;
use action_engine::invoker::{invoke, ExecutionContext};
use action_engine::report::{Console, ResultReporter};

fn print_help() {
    println!(
        "\
action-engine v{}

Runs one of the builtin actions and reports its outcome.

USAGE:
    action-engine [OPTIONS] <ACTION> [JSON_ARGS]
    action-engine [OPTIONS] --list

ARGUMENTS:
    ACTION       Action name, bare (add) or qualified (builtin.add)
    JSON_ARGS    Arguments as a JSON object [default: {{}}]

OPTIONS:
    -c, --config <PATH>         Path to TOML configuration file
    -l, --list                  Print the metadata of every action and exit
    -o, --json-output <PATH>    Write {{result, message, status}} to PATH
    -p, --print-result          Print the result as JSON
    -h, --help                  Print this help message and exit
    -V, --version               Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG    Log level filter for tracing
                (e.g. debug, action_engine=debug,warn)

EXIT STATUS:
    0    The action passed
    1    The action failed, or arguments did not match its signature
    2    The action passed but reporting its result failed

EXAMPLES:
    action-engine add '{{\"a\": 2, \"b\": 3}}'
    action-engine --print-result greet '{{\"name\": \"Ada\"}}'
    action-engine --config config/engine.toml mask_secret
    RUST_LOG=debug action-engine --list",
        env!("CARGO_PKG_VERSION"),
    );
}

#[derive(Debug, Default)]
struct Cli {
    config: Option<String>,
    list: bool,
    json_output: Option<PathBuf>,
    print_result: bool,
    positional: Vec<String>,
}

impl Cli {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut cli = Cli::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--version" | "-V" => {
                    println!("action-engine v{}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--config" | "-c" => {
                    cli.config = Some(args.next().ok_or_else(|| anyhow!("{arg} needs a path"))?);
                }
                "--json-output" | "-o" => {
                    let path = args.next().ok_or_else(|| anyhow!("{arg} needs a path"))?;
                    cli.json_output = Some(PathBuf::from(path));
                }
                "--list" | "-l" => cli.list = true,
                "--print-result" | "-p" => cli.print_result = true,
                other if other.starts_with('-') && other.len() > 1 => {
                    bail!("Unknown option: {other} (see --help)")
                }
                _ => cli.positional.push(arg),
            }
        }
        Ok(cli)
    }
}

fn parse_arguments(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).context("JSON_ARGS is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("JSON_ARGS must be a JSON object, got: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse(std::env::args().skip(1))?;

    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("Loading {path}"))?,
        None => Config::default(),
    };

    // Initialize logging (RUST_LOG overrides the configured filter)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    if let Some(path) = &cli.config {
        info!("Loaded configuration from {path}");
    }

    let mut registry = ActionRegistry::new();
    let rejected = registry.discover(builtin::declarations());
    if !rejected.is_empty() {
        error!("{} builtin actions could not be registered", rejected.len());
    }

    if cli.list {
        println!("{}", serde_json::to_string_pretty(&registry.metadata())?);
        return Ok(());
    }

    let name = cli
        .positional
        .first()
        .ok_or_else(|| anyhow!("No action given (see --help or --list)"))?;
    let arguments = parse_arguments(cli.positional.get(1).map(String::as_str))?;
    if cli.positional.len() > 2 {
        bail!("Unexpected extra arguments: {}", cli.positional[2..].join(" "));
    }

    let descriptor = registry
        .find_mut(name)
        .ok_or_else(|| anyhow!("Unknown action: {name} (see --list)"))?;

    let reporter = ResultReporter::new(Console::stdout(config.reporter.colors))
        .print_result(cli.print_result || config.reporter.print_result)
        .json_output(
            cli.json_output
                .clone()
                .or_else(|| config.reporter.json_output.clone()),
        );
    let hooks = LifecycleHooks::global();
    let registration = reporter.register(hooks);

    let ctx = ExecutionContext::new(hooks.clone())
        .with_managed(Arc::new(config.managed_values()));

    let code = match invoke(descriptor, arguments, &ctx).await {
        Ok(outcome) => {
            for failure in &outcome.hook_failures {
                error!("{failure}");
            }
            if outcome.status == Status::Fail {
                1
            } else if !outcome.hook_failures.is_empty() {
                2
            } else {
                0
            }
        }
        Err(e) => {
            error!("{e}");
            for failure in &e.hook_failures {
                error!("{failure}");
            }
            1
        }
    };
    drop(registration);

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
