//! `elmos module` - build, clean, inspect and queue modules

use anyhow::Context as _;
use clap::CommandFactory;
use tokio::sync::mpsc;

use elmos_core::build::{BuildDriver, BuildEvent, BuildTarget, LogStream};
use elmos_core::info::ModuleInfo;
use elmos_core::queue::{Outcome, QueueKind, QueueManager, WILDCARD};
use elmos_core::status::StatusReport;

use super::{Context, print_error, print_info, print_step, print_success, print_warn};
use crate::cli::Cli;
use crate::runner::MakeRunner;

/// Everything `elmos module` can do
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleAction {
    Build { name: Option<String> },
    Clean { name: Option<String> },
    Status { json: bool },
    Info { name: String },
    Insmod { name: String },
    Rmmod { name: String },
    Reset,
    List,
    New { name: String },
    Headers,
    Help,
}

pub async fn run_module(ctx: &Context, action: ModuleAction) -> anyhow::Result<()> {
    match action {
        ModuleAction::Build { name } => run_batch(ctx, name.as_deref(), BuildTarget::Modules).await,
        ModuleAction::Clean { name } => run_batch(ctx, name.as_deref(), BuildTarget::Clean).await,
        ModuleAction::Status { json } => run_status(ctx, json),
        ModuleAction::Info { name } => run_info(ctx, &name),
        ModuleAction::Insmod { name } => run_enqueue(ctx, QueueKind::Insmod, &name),
        ModuleAction::Rmmod { name } => run_enqueue(ctx, QueueKind::Rmmod, &name),
        ModuleAction::Reset => run_reset(ctx),
        ModuleAction::List => run_list(ctx),
        ModuleAction::New { name } => run_new(ctx, &name),
        ModuleAction::Headers => run_headers(ctx).await,
        ModuleAction::Help => run_help(),
    }
}

async fn run_batch(ctx: &Context, name: Option<&str>, target: BuildTarget) -> anyhow::Result<()> {
    ctx.ensure_kernel_dir()?;
    let registry = ctx.registry();

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx));

    let result = {
        let driver = BuildDriver::new(&ctx.config, &registry, MakeRunner::new()).with_events(tx);
        driver.run_batch(name, target).await
    };
    let _ = printer.await;

    let report = result?;
    if report.entries.is_empty() {
        print_info(format!("No modules found in {}", registry.root().display()));
        return Ok(());
    }

    match target {
        BuildTarget::Modules => print_success(format!("Built {} module(s)", report.entries.len())),
        BuildTarget::Clean => {
            let warnings = report.warnings().count();
            if warnings == 0 {
                print_success("Modules cleaned");
            } else {
                print_warn(format!("Modules cleaned with {} warning(s)", warnings));
            }
        }
    }
    Ok(())
}

/// One line per module, plus the build output as it streams
async fn print_events(mut rx: mpsc::UnboundedReceiver<BuildEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            BuildEvent::Started { module, target, .. } => match target {
                BuildTarget::Modules => print_step(format!("Building module: {}", module)),
                BuildTarget::Clean => print_step(format!("Cleaning module: {}", module)),
            },
            BuildEvent::Output { line, .. } => match line.stream {
                LogStream::Stderr => eprintln!("{}", line.text),
                LogStream::Stdout => println!("{}", line.text),
            },
            BuildEvent::Finished {
                module,
                target,
                exit_code,
            } => {
                let ok = exit_code == Some(0);
                match (target, ok) {
                    (BuildTarget::Modules, true) => print_success(format!("Built: {}", module)),
                    (BuildTarget::Modules, false) => {
                        print_error(format!("Failed to build module: {}", module))
                    }
                    (BuildTarget::Clean, true) => print_success(format!("Cleaned: {}", module)),
                    (BuildTarget::Clean, false) => {
                        print_warn(format!("Failed to clean module: {}", module))
                    }
                }
            }
        }
    }
}

fn run_status(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let registry = ctx.registry();
    let queue = ctx.queue_file().load()?;
    let report = StatusReport::collect(&registry, &queue)?;

    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    if report.is_empty() {
        print_info(format!("No modules found in {}", registry.root().display()));
        return Ok(());
    }

    println!();
    print!("{}", report.render_table());
    println!();
    Ok(())
}

fn run_info(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let info = ModuleInfo::read(&ctx.registry(), name)?;
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    println!("Module:      {}", info.name);
    println!("License:     {}", or_dash(&info.license));
    if info.authors.is_empty() {
        println!("Author:      -");
    } else {
        for author in &info.authors {
            println!("Author:      {}", author);
        }
    }
    println!("Description: {}", or_dash(&info.description));
    println!("Version:     {}", or_dash(&info.version));
    Ok(())
}

fn run_enqueue(ctx: &Context, kind: QueueKind, name: &str) -> anyhow::Result<()> {
    if name != WILDCARD {
        ctx.registry().find(name)?;
    }

    let mut queue = QueueManager::open(ctx.queue_file())?;
    let target = if name == WILDCARD { "all modules" } else { name };

    match queue.enqueue(kind, name)? {
        Outcome::Added => print_success(format!("Queued {} for {}", target, kind.label())),
        Outcome::AlreadyQueued => {
            print_info(format!("{} already queued for {}", target, kind.label()))
        }
    }
    Ok(())
}

fn run_reset(ctx: &Context) -> anyhow::Result<()> {
    let mut queue = QueueManager::open(ctx.queue_file())?;
    queue.reset()?;
    print_success("Cleared insmod and rmmod queues");
    Ok(())
}

fn run_list(ctx: &Context) -> anyhow::Result<()> {
    let registry = ctx.registry();
    let modules = registry.list(None)?;
    if modules.is_empty() {
        print_info(format!("No modules found in {}", registry.root().display()));
        return Ok(());
    }

    println!("Available modules:");
    for (i, name) in modules.iter().enumerate() {
        // A module without a readable source still gets listed
        let description = ModuleInfo::read(&registry, name)
            .ok()
            .and_then(|info| info.description);
        match description {
            Some(desc) => println!("  {}. {} - {}", i + 1, name, desc),
            None => println!("  {}. {}", i + 1, name),
        }
    }
    Ok(())
}

fn run_new(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let module = ctx.registry().create(name)?;
    print_success(format!("Created module: {}", module.source_path.display()));
    print_info(format!(
        "Edit {} to implement your module",
        module.source_file().display()
    ));
    Ok(())
}

async fn run_headers(ctx: &Context) -> anyhow::Result<()> {
    ctx.ensure_kernel_dir()?;
    let registry = ctx.registry();
    print_step("Preparing kernel headers for module building...");

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx));
    let result = {
        let driver = BuildDriver::new(&ctx.config, &registry, MakeRunner::new()).with_events(tx);
        driver.prepare_headers(ctx.jobs()).await
    };
    let _ = printer.await;

    result.context("modules_prepare failed")?;
    print_success("Kernel headers prepared");
    Ok(())
}

pub fn run_help() -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    match cmd.find_subcommand_mut("module") {
        Some(module) => module.print_long_help()?,
        None => cmd.print_long_help()?,
    }
    Ok(())
}
