//! Global-flag parsing via `clap`'s builder API.
//!
//! The command surface itself is resolved at runtime against the merged plugin
//! catalog (see [`crate::dispatch`]), so there is no `#[derive(Subcommand)]` enum to
//! define here — only the handful of flags that apply regardless of which command
//! runs, the builder API being the natural fit whenever the subcommand tree itself is
//! assembled dynamically rather than known at compile time.

use clap::{Arg, ArgAction, Command};

/// Flags recognized ahead of the command id; anything after the first non-flag
/// argument is forwarded to the resolved command untouched.
#[derive(Debug, Clone, Default)]
pub struct GlobalFlags {
    /// `--verbose`/`-v`: raise the default log level to debug when `RUST_LOG` is unset.
    pub verbose: bool,
    /// `--quiet`/`-q`: suppress the "update available" notice and progress bars.
    pub quiet: bool,
    /// `--no-progress`: suppress the download progress bar specifically.
    pub no_progress: bool,
    /// `--all`: include hidden commands and topics in help listings.
    pub all: bool,
}

fn root_command(bin: &str) -> Command {
    Command::new(bin.to_string())
        .disable_help_flag(true)
        .disable_help_subcommand(true)
        .arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::SetTrue))
        .arg(Arg::new("quiet").short('q').long("quiet").action(ArgAction::SetTrue))
        .arg(Arg::new("no_progress").long("no-progress").action(ArgAction::SetTrue))
        .arg(Arg::new("all").long("all").action(ArgAction::SetTrue))
        .arg(
            Arg::new("rest")
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true),
        )
}

/// Split `argv` (excluding the binary name) into recognized global flags and the
/// remaining command-id-plus-arguments vector.
///
/// Global flags must precede the command id — once the first positional argument is
/// seen, everything after it (including further `-v`/`-q`-shaped tokens) is treated as
/// belonging to the command, not to this crate.
#[must_use]
pub fn parse(bin: &str, argv: &[String]) -> (GlobalFlags, Vec<String>) {
    let matches = match root_command(bin).try_get_matches_from(std::iter::once(bin.to_string()).chain(argv.iter().cloned())) {
        Ok(matches) => matches,
        Err(_) => {
            // Malformed global-flag section; fall back to treating the whole argv as
            // the command's own responsibility rather than failing the process here.
            return (GlobalFlags::default(), argv.to_vec());
        }
    };

    let flags = GlobalFlags {
        verbose: matches.get_flag("verbose"),
        quiet: matches.get_flag("quiet"),
        no_progress: matches.get_flag("no_progress"),
        all: matches.get_flag("all"),
    };

    let rest = matches
        .get_many::<String>("rest")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    (flags, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_verbose_before_command() {
        let argv = vec!["-v".to_string(), "update".to_string()];
        let (flags, rest) = parse("kiln", &argv);
        assert!(flags.verbose);
        assert_eq!(rest, vec!["update".to_string()]);
    }

    #[test]
    fn forwards_flags_that_appear_after_the_command_id() {
        let argv = vec!["plugins:install".to_string(), "--verbose".to_string(), "foo".to_string()];
        let (flags, rest) = parse("kiln", &argv);
        assert!(!flags.verbose);
        assert_eq!(rest, vec!["plugins:install".to_string(), "--verbose".to_string(), "foo".to_string()]);
    }

    #[test]
    fn no_progress_flag_is_recognized() {
        let argv = vec!["--no-progress".to_string(), "update".to_string()];
        let (flags, _rest) = parse("kiln", &argv);
        assert!(flags.no_progress);
    }

    #[test]
    fn all_flag_is_recognized() {
        let argv = vec!["--all".to_string(), "help".to_string()];
        let (flags, rest) = parse("kiln", &argv);
        assert!(flags.all);
        assert_eq!(rest, vec!["help".to_string()]);
    }
}
