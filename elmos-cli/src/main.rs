mod cli;
mod commands;
mod logging;
mod runner;
mod ui;

use clap::Parser;

use cli::{Cli, Commands};
use commands::Context;
use commands::module::{ModuleAction, run_help};
use ui::MenuChoice;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();

    match cli.command {
        Some(Commands::Module(args)) => {
            let action = args.into_action()?;
            dispatch(config, action).await
        }
        Some(Commands::Init {
            yes,
            kernel_dir,
            arch,
        }) => commands::run_init(yes, kernel_dir, arch),
        Some(Commands::Doctor) => commands::run_doctor(config),
        Some(Commands::Tui) | None => run_tui(config).await,
    }
}

/// Help needs no workspace; everything else runs against the loaded config
async fn dispatch(config: Option<&std::path::Path>, action: ModuleAction) -> anyhow::Result<()> {
    if action == ModuleAction::Help {
        return run_help();
    }
    let ctx = Context::load(config)?;
    tracing::debug!(?action, "dispatching");
    commands::run_module(&ctx, action).await
}

async fn run_tui(config: Option<&std::path::Path>) -> anyhow::Result<()> {
    let subtitle = match Context::load(config) {
        Ok(ctx) => ctx.config_path.display().to_string(),
        Err(_) => "no config found (run `elmos init`)".to_string(),
    };

    match ui::run_menu(&subtitle)? {
        Some(MenuChoice::Module(action)) => dispatch(config, action).await,
        Some(MenuChoice::Doctor) => commands::run_doctor(config),
        None => Ok(()),
    }
}
