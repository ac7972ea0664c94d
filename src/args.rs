//! Command-line argument parsing and processing.
//!
//! Handles parsing of command-line arguments and provides a clean interface
//! for the main application logic. Supports the standard help, version, and
//! debug flags while gracefully handling unknown options.

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon with these settings
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
    },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut unknown_arg_found = false;
        let mut config_dir: Option<String> = None;

        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut i = 0;
        while i < args_vec.len() {
            match args_vec[i].as_str() {
                "--help" | "-h" => display_help = true,
                "--version" | "-V" => display_version = true,
                "--debug" | "-d" => debug_enabled = true,
                "--config" | "-c" => {
                    if i + 1 < args_vec.len() {
                        config_dir = Some(args_vec[i + 1].clone());
                        i += 1;
                    } else {
                        log_warning!("--config requires a directory argument");
                        unknown_arg_found = true;
                    }
                }
                unknown => {
                    log_warning!("Unknown argument: {unknown}");
                    unknown_arg_found = true;
                }
            }
            i += 1;
        }

        let action = if display_help {
            CliAction::ShowHelp
        } else if display_version {
            CliAction::ShowVersion
        } else if unknown_arg_found {
            CliAction::ShowHelpDueToError
        } else {
            CliAction::Run {
                debug_enabled,
                config_dir,
            }
        };

        ParsedArgs { action }
    }

    /// Parse from the process environment.
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Display version information in the logger's block style.
pub fn display_version_info() {
    log_version!();
    log_block_start!("Prayer times state tracker for the unified timetable");
    log_indented!("Tracks the prayer state, Islamic date, and next event times");
    log_end!();
}

/// Display usage information.
pub fn display_help() {
    log_version!();
    log_block_start!("Usage: luptr [OPTIONS]");
    log_pipe!();
    log_indented!("-h, --help          Show this help message");
    log_indented!("-V, --version       Show version information");
    log_indented!("-d, --debug         Enable debug output");
    log_indented!("-c, --config DIR    Load configuration from DIR/luptr.toml");
    log_end!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliAction {
        ParsedArgs::parse(args.iter().copied()).action
    }

    #[test]
    fn no_arguments_runs_normally() {
        assert_eq!(
            parse(&["luptr"]),
            CliAction::Run {
                debug_enabled: false,
                config_dir: None,
            }
        );
    }

    #[test]
    fn debug_and_config_flags() {
        assert_eq!(
            parse(&["luptr", "-d", "--config", "/etc/luptr"]),
            CliAction::Run {
                debug_enabled: true,
                config_dir: Some("/etc/luptr".to_string()),
            }
        );
    }

    #[test]
    fn help_wins_over_other_flags() {
        assert_eq!(parse(&["luptr", "-d", "--help"]), CliAction::ShowHelp);
    }

    #[test]
    fn version_flag() {
        assert_eq!(parse(&["luptr", "-V"]), CliAction::ShowVersion);
    }

    #[test]
    fn unknown_arguments_show_help() {
        assert_eq!(parse(&["luptr", "--bogus"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn config_without_a_value_is_an_error() {
        assert_eq!(parse(&["luptr", "--config"]), CliAction::ShowHelpDueToError);
    }
}
