//! Execution bodies for the builtin command surface: `update`, `plugins*`, `version`,
//! `help`, and the hidden `debug:errlog`.

use crate::config::Config;
use crate::core::KilnError;
use crate::help;
use crate::paths;
use crate::plugins::{PackageManager, PluginManager};
use crate::update::{self, SystemRandom};
use anyhow::Result;

/// Run `update [channel] [--autoupdate]`.
pub async fn update(config: &Config, args: &[String]) -> Result<()> {
    let autoupdate = args.iter().any(|a| a == "--autoupdate");
    let channel = args
        .iter()
        .find(|a| !a.starts_with('-'))
        .cloned()
        .unwrap_or_else(|| config.channel.clone());

    if autoupdate {
        crate::autoupdate::debounce(config).await;
    }

    let outcome = update::update_to(config, &channel, !autoupdate, &SystemRandom).await?;
    match &outcome {
        update::UpdateOutcome::NoOp { version } => {
            println!("{} is already up to date ({version})", config.name);
        }
        update::UpdateOutcome::Updated { from, to } => {
            println!("Updated {} from {from} to {to}", config.name);
        }
        update::UpdateOutcome::SkippedByPriority { available } => {
            println!("Update to {available} available but skipped by staged rollout");
        }
    }

    update::tidy(config, &config.version.to_string()).await.ok();
    Ok(())
}

/// Run `plugins` (list) and its subcommands (`install`, `update`, `uninstall`, `link`).
pub async fn plugins<PM: PackageManager>(
    config: &Config,
    manager: &PluginManager<PM>,
    id: &str,
    args: &[String],
) -> Result<()> {
    match id {
        "plugins" => {
            for record in manager.list_root_topics(config.show_hidden) {
                println!("{}", record.name);
            }
            Ok(())
        }
        "plugins:install" => {
            let spec = args.first().ok_or_else(|| {
                anyhow::Error::new(KilnError::Other {
                    message: "usage: plugins:install <name>[@<tag>]".to_string(),
                })
            })?;
            let (name, tag) = spec.split_once('@').map_or((spec.as_str(), None), |(n, t)| (n, Some(t)));
            manager.install(name, tag).await?;
            println!("installed {name}");
            Ok(())
        }
        "plugins:update" => {
            manager.update().await?;
            println!("updated plugins");
            Ok(())
        }
        "plugins:uninstall" | "plugins:unlink" => {
            let name = args.first().ok_or_else(|| {
                anyhow::Error::new(KilnError::Other {
                    message: "usage: plugins:uninstall <name>".to_string(),
                })
            })?;
            manager.remove(name).await?;
            println!("removed {name}");
            Ok(())
        }
        "plugins:link" => {
            let path = args.first().ok_or_else(|| {
                anyhow::Error::new(KilnError::Other {
                    message: "usage: plugins:link <path>".to_string(),
                })
            })?;
            let linked = crate::plugins::link(config, std::path::Path::new(path)).await?;
            println!("linked {}", linked.display());
            Ok(())
        }
        other => Err(anyhow::Error::new(KilnError::NotFound { id: other.to_string() })),
    }
}

/// Run `version`: print the user-agent string.
pub fn version(config: &Config) {
    println!("{}", config.user_agent());
}

/// Run `help [subject] [--all]`.
pub fn help<PM: PackageManager>(config: &Config, manager: &PluginManager<PM>, subject: Option<&str>) {
    match subject {
        None => print!("{}", help::render_root(&config.bin, &manager.list_root_topics(config.show_hidden))),
        Some(subject) => {
            if let Some(command) = manager.find_command(subject) {
                print!("{}", help::render_command(&command));
            } else if let Some(topic) = manager.find_topic(subject) {
                let commands = manager.commands_for_topic(&topic.name, config.show_hidden);
                print!("{}", help::render_topic(&topic, &commands));
            } else {
                print!("{}", help::render_root(&config.bin, &manager.list_root_topics(config.show_hidden)));
            }
        }
    }
}

/// Run the hidden `debug:errlog`: stream the internal error log to stdout.
pub async fn debug_errlog(config: &Config) -> Result<()> {
    let path = paths::err_log_file(config);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            print!("{contents}");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
