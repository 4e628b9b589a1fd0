use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use legacy_core::{AppConfig, Notificator, NotificatorBuilder, NotifierError, load_config};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "legacy-notifier", version, about = "Dead-man's switch email notifier")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to configuration file (JSON or YAML); falls back to the CONFIG environment variable
    #[arg(long = "config-file")]
    config_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the notification process
    Run(ConfigArgs),
    /// Perform a dry run of the notification process
    DryRun(ConfigArgs),
    /// Authenticate the email client so the notifier can send and read emails
    Authenticate(ConfigArgs),
}

fn initialize_tracing() {
    let default_directives = "legacy_notifier=info,legacy_core=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

fn build_notificator(config: AppConfig) -> Result<Notificator> {
    NotificatorBuilder::new(config)
        .build()
        .inspect_err(report)
        .wrap_err("failed to build the notificator")
}

fn report(err: &NotifierError) {
    tracing::error!(kind = ?err.kind(), error = %err, "notifier failed");
}

async fn notify(args: ConfigArgs, dry_run: bool) -> Result<()> {
    let mut config = load_config(args.config_file.as_deref()).wrap_err("failed to load configuration")?;
    if dry_run {
        tracing::info!("dry-running notification process");
        config = config.into_dry_run();
    } else {
        tracing::info!("running notification process");
    }

    let notificator = build_notificator(config)?;
    let notification = notificator
        .notify()
        .await
        .inspect_err(report)
        .wrap_err("notification process failed")?;

    tracing::info!(
        status = %notification.status(),
        record = %serde_json::to_string(&notification)?,
        "notification process done"
    );
    Ok(())
}

async fn authenticate(args: ConfigArgs) -> Result<()> {
    let config = load_config(args.config_file.as_deref()).wrap_err("failed to load configuration")?;
    tracing::info!("authenticating services");

    let notificator = build_notificator(config)?;
    notificator
        .authenticate(|addr, url| {
            tracing::info!(%addr, "waiting for the authorization redirect");
            println!("Please visit the following URL to authenticate: {url}");
        })
        .await
        .inspect_err(report)
        .wrap_err("authentication failed")?;

    tracing::info!("authentication process done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    initialize_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => notify(args, false).await,
        Commands::DryRun(args) => notify(args, true).await,
        Commands::Authenticate(args) => authenticate(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dry_run_with_config_file() {
        let cli = Cli::try_parse_from(["legacy-notifier", "dry-run", "--config-file", "config.yaml"]).unwrap();
        match cli.command {
            Commands::DryRun(args) => assert_eq!(args.config_file, Some(PathBuf::from("config.yaml"))),
            _ => panic!("expected dry-run"),
        }
    }

    #[test]
    fn test_config_file_is_optional() {
        let cli = Cli::try_parse_from(["legacy-notifier", "run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run(ConfigArgs { config_file: None })));
    }
}
