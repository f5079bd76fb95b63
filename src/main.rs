use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use lipstream::app::{
    JobOptions, init_logging, list_assets, plan_segments, run_job_command, run_serve_command,
    run_submit_command,
};
use lipstream::cli::{Cli, Commands, ConfigAction, JobArgs};
use lipstream::config::Config;
use owo_colors::OwoColorize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            job,
            dry_run,
            readiness_timeout,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(timeout) = readiness_timeout {
                config.set_readiness_timeout(timeout)?;
            }
            init_logging(&config.log, cli.verbose);
            let outcome = run_job_command(&config, &job_options(job), dry_run, cli.quiet).await?;
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Serve { socket, dry_run } => {
            let config = load_config(cli.config.as_deref())?;
            init_logging(&config.log, cli.verbose);
            run_serve_command(&config, socket, dry_run).await?;
        }
        Commands::Submit { job, socket } => {
            let config = load_config(cli.config.as_deref())?;
            init_logging(&config.log, cli.verbose);
            let events = run_submit_command(&config, &job_options(job), socket, cli.quiet).await?;
            let succeeded = events
                .last()
                .is_some_and(|e| e.event.kind() == "complete");
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Segment {
            text,
            target,
            ceiling,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let chunks = plan_segments(&config.segmenter, &text, target, ceiling)?;
            for chunk in &chunks {
                println!(
                    "{} {} {}",
                    format!("{:>2}", chunk.index).green(),
                    format!("[{:>3} chars]", chunk.char_len()).dimmed(),
                    chunk.text
                );
            }
        }
        Commands::Health => {
            let config = load_config(cli.config.as_deref())?;
            init_logging(&config.log, cli.verbose);
            check_health(&config).await?;
        }
        Commands::Assets { json } => {
            let config = load_config(cli.config.as_deref())?;
            let listing = list_assets(&config.assets)?;
            if json {
                println!("{}", listing.to_json()?);
            } else {
                println!("{}", "Reference images:".bold());
                for name in &listing.images {
                    println!("  {}", name);
                }
                println!("{}", "Voice samples:".bold());
                if listing.samples.is_empty() {
                    println!("  {}", "(none)".dimmed());
                }
                for name in &listing.samples {
                    println!("  {}", name);
                }
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "lipstream",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/lipstream/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    // Apply environment variable overrides
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn job_options(args: JobArgs) -> JobOptions {
    JobOptions {
        audio: args.audio,
        language: args.language,
        history_file: args.history,
        reference_image: args.image,
        voice_sample: args.voice,
        json: args.json,
    }
}

#[cfg(feature = "http")]
async fn check_health(config: &Config) -> Result<()> {
    use lipstream::collaborators::http::GpuServiceClient;

    let url = &config.services.gpu_service_url;
    let client = GpuServiceClient::new(url, config.services.request_timeout())?;
    let report = client.health().await?;

    let status = if report.is_healthy() {
        report.status.green().to_string()
    } else {
        report.status.yellow().to_string()
    };
    println!("{} {}", "GPU service:".dimmed(), url);
    println!("  status: {}", status);
    println!("  device: {}", report.device.as_deref().unwrap_or("unknown"));
    println!("  tts:    {}", loaded(report.models.tts));
    println!("  avatar: {}", loaded(report.models.avatar));

    if !report.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "http")]
fn loaded(ready: bool) -> String {
    if ready {
        "loaded".green().to_string()
    } else {
        "not loaded".red().to_string()
    }
}

#[cfg(not(feature = "http"))]
async fn check_health(_config: &Config) -> Result<()> {
    anyhow::bail!("built without the `http` feature; health checks are unavailable")
}

/// Handle config subcommands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    let config_path = custom_path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let marker = if config_path.exists() {
                "(exists)".green().to_string()
            } else {
                "(not found, using defaults)".dimmed().to_string()
            };
            println!("{} {}", config_path.display(), marker);
        }
    }

    Ok(())
}
