//! kiln CLI entry point.
//!
//! Parses global flags, builds the process-wide [`kiln_cli::config::Config`], wires up
//! logging, initializes the plugin catalog, runs the background autoupdate check, and
//! dispatches the resolved command.

use kiln_cli::config::Config;
use kiln_cli::core::user_friendly_error;
use kiln_cli::plugins::package_manager::YarnPackageManager;
use kiln_cli::plugins::provider::{BuiltinProvider, LinkedProvider, Provider, UserProvider};
use kiln_cli::plugins::{self, PluginManager};
use kiln_cli::{autoupdate, cli_args, commands, dispatch, paths};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let mut config = match Config::new("stable".to_string(), Vec::new()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let (flags, rest) = cli_args::parse(&config.bin, &argv);
    config.no_progress = config.no_progress || flags.no_progress || flags.quiet;
    config.show_hidden = flags.all;
    config.argv = rest.clone();

    init_logging(flags.verbose);

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match run(config, rest, flags.quiet).await {
        Ok(code) => code,
        Err(e) => {
            let ctx = user_friendly_error(e);
            ctx.display();
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: bool) {
    let rust_log_set = std::env::var("RUST_LOG").is_ok();
    let kiln_log = std::env::var(kiln_cli::config::ENV_LOG).ok();

    let filter = if rust_log_set {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    } else if let Some(level) = kiln_log {
        EnvFilter::new(level)
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

async fn run(config: Config, argv: Vec<String>, quiet: bool) -> anyhow::Result<ExitCode> {
    let links = plugins::load_links(&config).await;
    let providers: Vec<Box<dyn Provider>> = vec![
        Box::new(BuiltinProvider::new(BuiltinProvider::default_records(
            paths::client_root(&config),
        ))),
        Box::new(LinkedProvider::new(links)),
        Box::new(UserProvider::new(paths::user_plugins_dir(&config))),
    ];
    let manager = PluginManager::new(config.clone(), providers, YarnPackageManager);
    manager.init().await?;

    if !config.update_disabled {
        let quiet_config = Config { no_progress: quiet, ..config.clone() };
        autoupdate::maybe_spawn_autoupdate(&quiet_config, false).await;
    }

    match dispatch::resolve(&manager, &argv, &config.default_command) {
        dispatch::Resolution::Command(command, args) => run_command(&config, &manager, &command.id, &args).await,
        dispatch::Resolution::Topic(topic) => {
            let commands = manager.commands_for_topic(&topic.name, config.show_hidden);
            print!("{}", kiln_cli::help::render_topic(&topic, &commands));
            Ok(ExitCode::SUCCESS)
        }
        dispatch::Resolution::RootHelp => {
            commands::help(&config, &manager, None);
            Ok(ExitCode::SUCCESS)
        }
        dispatch::Resolution::NotFound { id, suggestions } => {
            eprintln!("error: command not found: {id}");
            if !suggestions.is_empty() {
                eprintln!("did you mean: {}", suggestions.join(", "));
            }
            Ok(ExitCode::from(127))
        }
    }
}

async fn run_command(
    config: &Config,
    manager: &PluginManager<YarnPackageManager>,
    id: &str,
    args: &[String],
) -> anyhow::Result<ExitCode> {
    if args.first().is_some_and(|a| a == "--help") {
        commands::help(config, manager, Some(id));
        return Ok(ExitCode::SUCCESS);
    }

    let result = match id {
        "update" => commands::update(config, args).await,
        "version" => {
            commands::version(config);
            Ok(())
        }
        "help" => {
            commands::help(config, manager, args.first().map(String::as_str));
            Ok(())
        }
        "debug:errlog" => commands::debug_errlog(config).await,
        other if other.starts_with("plugins") => commands::plugins(config, manager, other, args).await,
        other => Err(anyhow::Error::new(dispatch::not_found_error(other))),
    };

    result.map(|()| ExitCode::SUCCESS)
}
