mod doctor;
mod init;
pub mod module;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use sysinfo::System;

use elmos_core::config::ElmosConfig;
use elmos_core::queue_file::QueueFile;
use elmos_core::registry::ModuleRegistry;

pub use doctor::run_doctor;
pub use init::run_init;
pub use module::run_module;

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct Context {
    pub config_path: PathBuf,
    pub config: ElmosConfig,
}

impl Context {
    /// Load the explicit config file, or discover one from the working directory
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            let config = ElmosConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            return Ok(Self {
                config_path: path.to_path_buf(),
                config,
            });
        }

        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let (config_path, config) = ElmosConfig::discover(&cwd)
            .context("no usable elmos config (run `elmos init` to create one)")?;
        tracing::info!(path = %config_path.display(), "loaded config");
        Ok(Self {
            config_path,
            config,
        })
    }

    pub fn registry(&self) -> ModuleRegistry {
        ModuleRegistry::new(self.config.modules_dir())
    }

    pub fn queue_file(&self) -> QueueFile {
        QueueFile::new(self.config.queue_file())
    }

    /// Parallel jobs for kernel-tree targets
    pub fn jobs(&self) -> usize {
        self.config.build.jobs.unwrap_or_else(host_cpu_count)
    }

    /// Builds need the kernel tree to be present (image mounted, source cloned)
    pub fn ensure_kernel_dir(&self) -> anyhow::Result<()> {
        let dir = self.config.kernel_dir();
        if !dir.is_dir() {
            anyhow::bail!(
                "kernel source directory not found: {} (is the workspace image mounted?)",
                dir.display()
            );
        }
        Ok(())
    }
}

pub fn host_cpu_count() -> usize {
    let mut system = System::new();
    system.refresh_cpu_all();
    system.cpus().len().max(1)
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

pub fn print_step(msg: impl AsRef<str>) {
    println!("{}==>{} {}", BLUE, RESET, msg.as_ref());
}

pub fn print_success(msg: impl AsRef<str>) {
    println!("{}✓{} {}", GREEN, RESET, msg.as_ref());
}

pub fn print_warn(msg: impl AsRef<str>) {
    println!("{}!{} {}", YELLOW, RESET, msg.as_ref());
}

pub fn print_error(msg: impl AsRef<str>) {
    eprintln!("{}✗{} {}", RED, RESET, msg.as_ref());
}

pub fn print_info(msg: impl AsRef<str>) {
    println!("{}•{} {}", DIM, RESET, msg.as_ref());
}
