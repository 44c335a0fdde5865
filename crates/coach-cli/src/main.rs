//! CLI entry point - the composition root.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use coach_cli::{Cli, CliConfig, Commands, bootstrap, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before reading any configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "coach_voice=debug,coach_cli=debug"
    } else {
        "coach_voice=info,coach_cli=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Run { seed, eager } => {
            let config = CliConfig {
                assets_dir: cli.assets_dir,
                seed,
                eager,
            };
            let ctx = bootstrap(&config)?;
            handlers::run::execute(ctx).await?;
        }
        Commands::Assets => {
            let config = CliConfig {
                assets_dir: cli.assets_dir,
                ..CliConfig::default()
            };
            handlers::assets::execute(&config.coach_config().assets_dir)?;
        }
        Commands::Devices => {
            handlers::devices::execute()?;
        }
        Commands::Credits => {
            let config = CliConfig {
                assets_dir: cli.assets_dir,
                ..CliConfig::default()
            };
            handlers::credits::execute(&config.coach_config().elevenlabs).await?;
        }
    }

    Ok(())
}
