//! Resolves argv into a command or topic and drives its execution, translating the
//! outcome into a process exit code.

use crate::core::KilnError;
use crate::plugins::{CommandRecord, PackageManager, PluginManager, TopicRecord};
use strsim::levenshtein;

const MAX_SUGGESTIONS: usize = 3;
const MAX_SUGGESTION_DISTANCE: usize = 2;

/// What the dispatcher decided to do with a given argv.
pub enum Resolution {
    /// Run this command with the remaining argv.
    Command(CommandRecord, Vec<String>),
    /// Render help for this topic.
    Topic(TopicRecord),
    /// Render the root help banner.
    RootHelp,
    /// No command or topic matched `id`; carries spelling suggestions, if any.
    NotFound { id: String, suggestions: Vec<String> },
}

/// Exit code policy: success, not-found (127), or generic failure (1).
#[must_use]
pub fn exit_code(resolution_failed_not_found: bool, command_failed: bool) -> i32 {
    if resolution_failed_not_found {
        127
    } else if command_failed {
        1
    } else {
        0
    }
}

/// Resolve post-binary `argv` against `manager`'s merged catalog.
///
/// A bare `--help`/`-h` appearing before any `--` terminator always wins, regardless
/// of `id`.
pub fn resolve<PM: PackageManager>(manager: &PluginManager<PM>, argv: &[String], default_command: &str) -> Resolution {
    if help_flag_requested(argv) {
        let id = argv.first().cloned().unwrap_or_default();
        if id.is_empty() {
            return Resolution::RootHelp;
        }
        if let Some(command) = manager.find_command(&id) {
            return Resolution::Command(command, vec!["--help".to_string()]);
        }
        if let Some(topic) = manager.find_topic(&id) {
            return Resolution::Topic(topic);
        }
        return Resolution::RootHelp;
    }

    let id = argv.first().cloned().filter(|s| !s.is_empty()).unwrap_or_else(|| default_command.to_string());
    let rest = argv.get(1..).map(<[String]>::to_vec).unwrap_or_default();

    if let Some(command) = manager.find_command(&id) {
        return Resolution::Command(command, rest);
    }

    if let Some(topic) = manager.find_topic(&id) {
        return Resolution::Topic(topic);
    }

    let suggestions = suggest(manager, &id);
    Resolution::NotFound { id, suggestions }
}

fn help_flag_requested(argv: &[String]) -> bool {
    for arg in argv {
        if arg == "--" {
            return false;
        }
        if arg == "--help" || arg == "-h" {
            return true;
        }
    }
    false
}

fn suggest<PM: PackageManager>(manager: &PluginManager<PM>, id: &str) -> Vec<String> {
    let mut candidates: Vec<(usize, String)> = manager
        .list_root_commands(true)
        .into_iter()
        .chain(all_known_command_ids(manager))
        .map(|cmd| cmd.id)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(|candidate| (levenshtein(id, &candidate), candidate))
        .filter(|(distance, _)| *distance <= MAX_SUGGESTION_DISTANCE)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    candidates.into_iter().take(MAX_SUGGESTIONS).map(|(_, id)| id).collect()
}

fn all_known_command_ids<PM: PackageManager>(manager: &PluginManager<PM>) -> Vec<CommandRecord> {
    manager
        .list_root_topics(true)
        .into_iter()
        .flat_map(|topic| manager.commands_for_topic(&topic.name, true))
        .collect()
}

/// Build a [`KilnError::NotFound`] for a failed resolution.
#[must_use]
pub fn not_found_error(id: &str) -> KilnError {
    KilnError::NotFound { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::plugins::package_manager::FakePackageManager;
    use crate::plugins::provider::BuiltinProvider;
    use crate::plugins::Provider;

    async fn manager() -> PluginManager<FakePackageManager> {
        let config = Config::for_test();
        let records = BuiltinProvider::default_records(std::path::PathBuf::from("/bin"));
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(BuiltinProvider::new(records))];
        let manager = PluginManager::new(config, providers, FakePackageManager::default());
        manager.init().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn resolves_known_command() {
        let manager = manager().await;
        let argv = vec!["update".to_string()];
        match resolve(&manager, &argv, "help") {
            Resolution::Command(cmd, rest) => {
                assert_eq!(cmd.id, "update");
                assert!(rest.is_empty());
            }
            _ => panic!("expected Command resolution"),
        }
    }

    #[tokio::test]
    async fn empty_argv_falls_back_to_default_command() {
        let manager = manager().await;
        match resolve(&manager, &[], "help") {
            Resolution::Command(cmd, rest) => {
                assert_eq!(cmd.id, "help");
                assert!(rest.is_empty());
            }
            _ => panic!("expected the default command to resolve"),
        }
    }

    #[tokio::test]
    async fn help_flag_wins_regardless_of_command_validity() {
        let manager = manager().await;
        let argv = vec!["update".to_string(), "--help".to_string()];
        match resolve(&manager, &argv, "help") {
            Resolution::Command(cmd, rest) => {
                assert_eq!(cmd.id, "update");
                assert_eq!(rest, vec!["--help".to_string()]);
            }
            _ => panic!("expected Command resolution with --help forwarded"),
        }
    }

    #[tokio::test]
    async fn unknown_command_suggests_close_matches() {
        let manager = manager().await;
        let argv = vec!["updat".to_string()];
        match resolve(&manager, &argv, "help") {
            Resolution::NotFound { suggestions, .. } => {
                assert!(suggestions.contains(&"update".to_string()));
            }
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn exit_code_maps_not_found_to_127() {
        assert_eq!(exit_code(true, false), 127);
        assert_eq!(exit_code(false, true), 1);
        assert_eq!(exit_code(false, false), 0);
    }
}
