//! Command-line interface for lipstream
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Progressive talking-avatar pipeline
#[derive(Parser, Debug)]
#[command(
    name = "lipstream",
    version,
    about = "Turn a spoken question into a stream of short talking-avatar clips"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress event output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration such as `10s`, `1500ms` or a bare number of seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Per-job options shared by `run` and `submit`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// Recorded user speech
    #[arg(value_name = "AUDIO")]
    pub audio: PathBuf,

    /// Spoken language code (default: from config). Examples: en, es, zh
    #[arg(long, short = 'l', value_name = "LANG")]
    pub language: Option<String>,

    /// JSON file with earlier turns: [{"role": "user", "content": "..."}]
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Reference image file name inside the images directory
    #[arg(long, value_name = "NAME")]
    pub image: Option<String>,

    /// Voice sample file name inside the voice samples directory
    #[arg(long, value_name = "NAME")]
    pub voice: Option<String>,

    /// Print events as JSON lines on stdout instead of rendering them
    #[arg(long)]
    pub json: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one job in this process
    Run {
        #[command(flatten)]
        job: JobArgs,

        /// Use built-in mock collaborators instead of the GPU service
        #[arg(long)]
        dry_run: bool,

        /// Override how long to wait for each clip to settle (e.g. 10s, 2500ms)
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        readiness_timeout: Option<Duration>,
    },

    /// Serve jobs on a Unix socket
    Serve {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/lipstream.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Use built-in mock collaborators instead of the GPU service
        #[arg(long)]
        dry_run: bool,
    },

    /// Send a job to a running server and follow its events
    Submit {
        #[command(flatten)]
        job: JobArgs,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/lipstream.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Show how a response text would be split into chunks
    Segment {
        /// Text to split
        text: String,

        /// Preferred maximum characters per chunk
        #[arg(long, value_name = "CHARS")]
        target: Option<usize>,

        /// Hard character ceiling for the first chunk
        #[arg(long, value_name = "CHARS")]
        ceiling: Option<usize>,
    },

    /// Check the GPU service
    Health,

    /// List reference images and voice samples jobs can choose from
    Assets {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Target shell (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

/// Config subcommand actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_minimal() {
        let cli = Cli::try_parse_from(["lipstream", "run", "question.wav"]).unwrap();
        match cli.command {
            Commands::Run {
                job,
                dry_run,
                readiness_timeout,
            } => {
                assert_eq!(job.audio, PathBuf::from("question.wav"));
                assert!(job.language.is_none());
                assert!(job.history.is_none());
                assert!(!job.json);
                assert!(!dry_run);
                assert!(readiness_timeout.is_none());
            }
            other => panic!("Expected Run command, got {:?}", other),
        }
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "lipstream",
            "run",
            "q.wav",
            "--language",
            "es",
            "--history",
            "turns.json",
            "--image",
            "alice.png",
            "--voice",
            "alice.wav",
            "--json",
            "--dry-run",
            "--readiness-timeout",
            "2500ms",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                job,
                dry_run,
                readiness_timeout,
            } => {
                assert_eq!(job.language.as_deref(), Some("es"));
                assert_eq!(job.history, Some(PathBuf::from("turns.json")));
                assert_eq!(job.image.as_deref(), Some("alice.png"));
                assert_eq!(job.voice.as_deref(), Some("alice.wav"));
                assert!(job.json);
                assert!(dry_run);
                assert_eq!(readiness_timeout, Some(Duration::from_millis(2500)));
            }
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_run_requires_audio() {
        assert!(Cli::try_parse_from(["lipstream", "run"]).is_err());
    }

    #[test]
    fn test_parse_verbose_counts() {
        let cli = Cli::try_parse_from(["lipstream", "-vv", "health"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Health));
    }

    #[test]
    fn test_parse_assets() {
        let cli = Cli::try_parse_from(["lipstream", "assets"]).unwrap();
        assert!(matches!(cli.command, Commands::Assets { json: false }));

        let cli = Cli::try_parse_from(["lipstream", "assets", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Assets { json: true }));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "lipstream",
            "serve",
            "--config",
            "/etc/lipstream.toml",
            "-q",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/lipstream.toml")));
        assert!(cli.quiet);
        match cli.command {
            Commands::Serve { socket, dry_run } => {
                assert!(socket.is_none());
                assert!(!dry_run);
            }
            other => panic!("Expected Serve command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_submit_with_socket() {
        let cli = Cli::try_parse_from([
            "lipstream",
            "submit",
            "q.wav",
            "--socket",
            "/tmp/test.sock",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit { job, socket } => {
                assert_eq!(job.audio, PathBuf::from("q.wav"));
                assert_eq!(socket, Some(PathBuf::from("/tmp/test.sock")));
            }
            other => panic!("Expected Submit command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_segment() {
        let cli = Cli::try_parse_from([
            "lipstream",
            "segment",
            "Hello. Welcome.",
            "--target",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Segment {
                text,
                target,
                ceiling,
            } => {
                assert_eq!(text, "Hello. Welcome.");
                assert_eq!(target, Some(30));
                assert!(ceiling.is_none());
            }
            other => panic!("Expected Segment command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["lipstream", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
        let cli = Cli::try_parse_from(["lipstream", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["lipstream", "completions", "bash"]).unwrap();
        match cli.command {
            Commands::Completions { shell } => assert_eq!(shell, Shell::Bash),
            other => panic!("Expected Completions command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
