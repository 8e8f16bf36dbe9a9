use std::path::PathBuf;

use anyhow::bail;
use clap::{ArgGroup, Args, Parser, Subcommand};

use elmos_core::queue::WILDCARD;

use crate::commands::module::ModuleAction;

#[derive(Parser, Debug)]
#[command(name = "elmos")]
#[command(about = "Build, clean and queue out-of-tree kernel modules", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ELMOS_CONFIG or elmos.yaml in this or a parent directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, clean, inspect or queue modules
    Module(ModuleArgs),
    /// Write a starter elmos.yaml in the current directory
    Init {
        #[arg(short, long)]
        yes: bool,
        /// Kernel source tree
        #[arg(long, default_value = "linux")]
        kernel_dir: PathBuf,
        /// Kernel ARCH value
        #[arg(long)]
        arch: Option<String>,
    },
    /// Check host tools and configured paths
    Doctor,
    /// Interactive menu
    Tui,
}

#[derive(Args, Debug, Default)]
#[command(group(
    ArgGroup::new("action")
        .args(["clean", "insmod", "rmmod", "reset", "status", "info", "list", "new", "headers"])
        .multiple(false)
))]
pub struct ModuleArgs {
    /// Module name; all modules when omitted
    pub name: Option<String>,

    /// Run `make clean` instead of building
    #[arg(long)]
    pub clean: bool,

    /// Queue for loading on next boot (all modules when no name is given)
    #[arg(long)]
    pub insmod: bool,

    /// Queue for unloading on next boot (all modules when no name is given)
    #[arg(long)]
    pub rmmod: bool,

    /// Clear both queues
    #[arg(long)]
    pub reset: bool,

    /// Show build and queue status
    #[arg(long)]
    pub status: bool,

    /// Show license, author and description of a module
    #[arg(long)]
    pub info: bool,

    /// List modules with their descriptions
    #[arg(long)]
    pub list: bool,

    /// Create a new module from the template
    #[arg(long)]
    pub new: bool,

    /// Run `modules_prepare` in the kernel tree
    #[arg(long)]
    pub headers: bool,

    /// Print status as JSON
    #[arg(long, requires = "status")]
    pub json: bool,
}

impl ModuleArgs {
    /// Map flags onto exactly one action
    pub fn into_action(self) -> anyhow::Result<ModuleAction> {
        let name = self.name;

        if self.clean {
            Ok(ModuleAction::Clean { name })
        } else if self.insmod {
            Ok(ModuleAction::Insmod {
                name: name.unwrap_or_else(|| WILDCARD.to_string()),
            })
        } else if self.rmmod {
            Ok(ModuleAction::Rmmod {
                name: name.unwrap_or_else(|| WILDCARD.to_string()),
            })
        } else if self.reset {
            reject_name("reset", &name)?;
            Ok(ModuleAction::Reset)
        } else if self.status {
            reject_name("status", &name)?;
            Ok(ModuleAction::Status { json: self.json })
        } else if self.list {
            reject_name("list", &name)?;
            Ok(ModuleAction::List)
        } else if self.headers {
            reject_name("headers", &name)?;
            Ok(ModuleAction::Headers)
        } else if self.info {
            match name {
                Some(name) => Ok(ModuleAction::Info { name }),
                None => bail!("--info requires a module name"),
            }
        } else if self.new {
            match name {
                Some(name) => Ok(ModuleAction::New { name }),
                None => bail!("--new requires a module name"),
            }
        } else {
            Ok(ModuleAction::Build { name })
        }
    }
}

fn reject_name(flag: &str, name: &Option<String>) -> anyhow::Result<()> {
    if let Some(n) = name {
        bail!("--{} does not take a module name (got '{}')", flag, n);
    }
    Ok(())
}
