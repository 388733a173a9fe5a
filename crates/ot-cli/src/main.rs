use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ot_cli::commands::{self, App, chat, reading, reset, status};
use ot_cli::render::Renderer;
use ot_cli::{Cli, Commands, Config};
use ot_core::UserId;

/// Load config, open the database and resolve the acting user.
fn open_app(cli: &Cli) -> Result<(App, Renderer, UserId)> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let app = commands::open_app(&config)?;
    let user_id = commands::resolve_user(cli.user.as_deref(), &config)?;
    Ok((app, commands::renderer(&config), user_id))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (app, renderer, user_id) = open_app(&cli)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let mut stdout = std::io::stdout().lock();

    runtime.block_on(async {
        match command {
            Commands::Km(args) => {
                reading::km(&mut stdout, &app, &renderer, &user_id, &args.km, args.new_oil)
                    .await?;
            }
            Commands::Photo(args) => {
                reading::photo(
                    &mut stdout,
                    &app,
                    &renderer,
                    &user_id,
                    &args.path,
                    args.new_oil,
                )
                .await?;
            }
            Commands::Reset => reset::run(&mut stdout, &app, &renderer, &user_id).await?,
            Commands::Status { json } => {
                status::run(&mut stdout, &app, &renderer, &user_id, *json).await?;
            }
            Commands::Chat => {
                let stdin = std::io::stdin().lock();
                chat::run(stdin, &mut stdout, &app, &renderer, &user_id).await?;
            }
        }
        Ok::<_, anyhow::Error>(())
    })
}
