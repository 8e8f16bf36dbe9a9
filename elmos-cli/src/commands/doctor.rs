use std::path::Path;
use std::process::Command;

use sysinfo::System;

use elmos_core::config::{ConfigError, ElmosConfig};
use elmos_core::registry::BUILD_DESCRIPTOR;

use super::{Context, host_cpu_count};

#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl Check {
    fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub fn run_doctor(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("elmos Doctor\n");

    let ctx = match Context::load(config_path) {
        Ok(ctx) => Some(ctx),
        // A config that exists but does not load is fatal; a missing one is just reported
        Err(e) if config_path.is_some() || !is_not_found(&e) => return Err(e),
        Err(e) => {
            tracing::debug!(error = %format!("{:#}", e), "config not loaded");
            None
        }
    };

    // === Toolchain ===
    println!("Toolchain:");
    let mut checks: Vec<Check> = Vec::new();
    checks.push(check_tool("make", "make", &["--version"], "Install GNU make"));
    match &ctx {
        Some(ctx) if !ctx.config.build.llvm => {
            let gcc = format!("{}gcc", ctx.config.build.cross_compile);
            checks.push(check_tool(
                &gcc,
                &gcc,
                &["--version"],
                "Install the cross toolchain or set build.cross_compile",
            ));
        }
        _ => {
            checks.push(check_tool("clang", "clang", &["--version"], "Install LLVM/clang"));
            checks.push(check_tool("ld.lld", "ld.lld", &["--version"], "Install LLVM lld"));
        }
    }
    for check in &checks {
        print_check(check);
    }
    println!();

    // === Workspace ===
    let mut workspace_checks = Vec::new();
    match &ctx {
        Some(ctx) => {
            println!("Configuration: {}\n", ctx.config_path.display());
            workspace_checks.extend(check_workspace(ctx));
        }
        None => {
            println!("Configuration: not found");
            println!("  Run `elmos init` to create one");
            println!();
        }
    }
    if !workspace_checks.is_empty() {
        println!("Workspace:");
        for check in &workspace_checks {
            print_check(check);
        }
        println!();
    }

    // === Host ===
    println!("Host:");
    print_check(&check_host());
    println!();

    // === Summary ===
    let failed: Vec<_> = checks
        .iter()
        .chain(workspace_checks.iter())
        .filter(|c| !c.passed)
        .collect();

    if failed.is_empty() {
        println!("All checks passed!");
    } else {
        println!("Issues found:");
        for check in &failed {
            println!("  - {}: {}", check.name, check.message);
            if let Some(hint) = &check.hint {
                println!("    Hint: {}", hint);
            }
        }
    }

    Ok(())
}

fn is_not_found(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<ConfigError>(), Some(ConfigError::NotFound { .. }))
}

fn print_check(check: &Check) {
    let icon = if check.passed { "✓" } else { "✗" };
    let color = if check.passed { "\x1b[32m" } else { "\x1b[31m" };
    let reset = "\x1b[0m";

    println!(
        "  {}{}{} {}: {}",
        color, icon, reset, check.name, check.message
    );

    if let Some(hint) = &check.hint {
        println!("    └─ {}", hint);
    }
}

fn check_tool(name: &str, program: &str, args: &[&str], hint: &str) -> Check {
    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let first = stdout.lines().next().unwrap_or("").trim().to_string();
            Check::ok(name, if first.is_empty() { "found".into() } else { first })
        }
        Ok(_) => Check::fail(name, format!("error running {}", program)),
        Err(_) => Check::fail(name, "not installed").with_hint(hint),
    }
}

fn check_workspace(ctx: &Context) -> Vec<Check> {
    let config: &ElmosConfig = &ctx.config;
    let mut checks = Vec::new();

    let kernel = config.kernel_dir();
    if !kernel.is_dir() {
        checks.push(
            Check::fail("kernel", format!("{} not found", kernel.display()))
                .with_hint("Mount the workspace image and clone the kernel source"),
        );
    } else if !kernel.join(BUILD_DESCRIPTOR).is_file() {
        checks.push(
            Check::fail("kernel", format!("{} has no Makefile", kernel.display()))
                .with_hint("paths.kernel_dir should point at the top of a kernel tree"),
        );
    } else {
        checks.push(Check::ok("kernel", kernel.display().to_string()));
    }

    let registry = ctx.registry();
    match registry.list(None) {
        Ok(modules) if registry.root().is_dir() => checks.push(Check::ok(
            "modules",
            format!("{} ({} module(s))", registry.root().display(), modules.len()),
        )),
        Ok(_) => checks.push(
            Check::fail("modules", format!("{} not found", registry.root().display()))
                .with_hint("Run `elmos module <name> --new` to create one"),
        ),
        Err(e) => checks.push(Check::fail("modules", e.to_string())),
    }

    let queue = ctx.queue_file();
    match queue.load() {
        Ok(state) => checks.push(Check::ok(
            "queue",
            format!(
                "{} insmod, {} rmmod ({})",
                state.insmod.len(),
                state.rmmod.len(),
                queue.path().display()
            ),
        )),
        Err(e) => checks.push(Check::fail("queue", e.to_string())),
    }

    checks
}

fn check_host() -> Check {
    let mut system = System::new();
    system.refresh_memory();
    let total_gib = system.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
    Check::ok(
        "resources",
        format!("{} CPU(s), {:.1} GiB memory", host_cpu_count(), total_gib),
    )
}
