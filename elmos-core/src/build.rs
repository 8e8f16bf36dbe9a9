//! Build driver
//!
//! Turns a module + target into a `make` invocation against the kernel tree and
//! runs batches of them one at a time. Builds stop at the first failure; cleans
//! record the failure and move on to the next module.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::ElmosConfig;
use crate::error::BuildError;
use crate::registry::ModuleRegistry;

/// Label used for the kernel-tree `modules_prepare` run
pub const PREPARE_LABEL: &str = "modules_prepare";

/// Which output stream a line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: LogStream,
    pub text: String,
}

/// Build-system action for a module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BuildTarget {
    #[default]
    Modules,
    Clean,
}

impl BuildTarget {
    /// The make target name
    pub fn as_make_target(&self) -> &'static str {
        match self {
            BuildTarget::Modules => "modules",
            BuildTarget::Clean => "clean",
        }
    }

    /// Whether a non-zero exit should stop the batch
    pub fn is_fatal_on_failure(&self) -> bool {
        matches!(self, BuildTarget::Modules)
    }
}

/// A fully rendered external command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MakeInvocation {
    /// Module name, or `modules_prepare` for kernel-tree runs
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl MakeInvocation {
    /// `make -C <kernel> M=<module> ARCH=.. [LLVM=1] [CROSS_COMPILE=..] [HOSTCFLAGS=..] <target>`
    pub fn for_module(
        config: &ElmosConfig,
        label: &str,
        module_path: &Path,
        target: BuildTarget,
    ) -> Self {
        let mut args = vec![
            "-C".to_string(),
            config.kernel_dir().display().to_string(),
            format!("M={}", module_path.display()),
        ];
        args.extend(toolchain_vars(config));
        if !config.build.host_cflags.is_empty() {
            args.push(format!("HOSTCFLAGS={}", config.build.host_cflags));
        }
        args.push(target.as_make_target().to_string());

        Self {
            label: label.to_string(),
            program: "make".into(),
            args,
            env: config.build.env.clone(),
        }
    }

    /// `make -C <kernel> ARCH=.. [LLVM=1] [CROSS_COMPILE=..] -j<jobs> modules_prepare`
    pub fn modules_prepare(config: &ElmosConfig, jobs: usize) -> Self {
        let mut args = vec![
            "-C".to_string(),
            config.kernel_dir().display().to_string(),
        ];
        args.extend(toolchain_vars(config));
        args.push(format!("-j{}", jobs.max(1)));
        args.push(PREPARE_LABEL.to_string());

        Self {
            label: PREPARE_LABEL.to_string(),
            program: "make".into(),
            args,
            env: config.build.env.clone(),
        }
    }

    /// Shell-like rendering for logs
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| {
            if a.contains(char::is_whitespace) {
                format!("'{}'", a)
            } else {
                a.clone()
            }
        }));
        parts.join(" ")
    }
}

fn toolchain_vars(config: &ElmosConfig) -> Vec<String> {
    let mut vars = vec![format!("ARCH={}", config.build.arch)];
    if config.build.llvm {
        vars.push("LLVM=1".to_string());
    }
    if !config.build.cross_compile.is_empty() {
        vars.push(format!("CROSS_COMPILE={}", config.build.cross_compile));
    }
    vars
}

/// How an external process ended
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when terminated by a signal
    pub code: Option<i32>,
    pub output: Vec<OutputLine>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Outcome of one module invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildResult {
    pub module: String,
    pub target: BuildTarget,
    pub exit_code: Option<i32>,
    pub output: Vec<OutputLine>,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a [`MakeInvocation`]. The CLI spawns real processes; tests script results.
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// Run to completion. `on_line` sees every output line as it arrives.
    async fn invoke(
        &self,
        invocation: &MakeInvocation,
        on_line: &(dyn for<'l> Fn(&'l OutputLine) + Send + Sync),
    ) -> Result<ProcessExit, BuildError>;
}

/// Progress notifications for a running batch
#[derive(Clone, Debug)]
pub enum BuildEvent {
    Started {
        module: String,
        target: BuildTarget,
        command: String,
    },
    Output {
        module: String,
        line: OutputLine,
    },
    Finished {
        module: String,
        target: BuildTarget,
        exit_code: Option<i32>,
    },
}

/// Per-module result inside a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchEntry {
    Built { module: String },
    Cleaned { module: String },
    CleanFailed { module: String, code: Option<i32> },
}

impl BatchEntry {
    pub fn module(&self) -> &str {
        match self {
            BatchEntry::Built { module }
            | BatchEntry::Cleaned { module }
            | BatchEntry::CleanFailed { module, .. } => module,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, BatchEntry::CleanFailed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    pub target: BuildTarget,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn warnings(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| e.is_warning())
    }
}

pub struct BuildDriver<'a, B: BuildBackend> {
    config: &'a ElmosConfig,
    registry: &'a ModuleRegistry,
    backend: B,
    events: Option<mpsc::UnboundedSender<BuildEvent>>,
}

impl<'a, B: BuildBackend> BuildDriver<'a, B> {
    pub fn new(config: &'a ElmosConfig, registry: &'a ModuleRegistry, backend: B) -> Self {
        Self {
            config,
            registry,
            backend,
            events: None,
        }
    }

    /// Publish progress on `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<BuildEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run `target` for one module and return the raw result, whatever the exit code
    pub async fn build(&self, module: &str, target: BuildTarget) -> Result<BuildResult, BuildError> {
        let handle = self.registry.find(module)?;
        let invocation =
            MakeInvocation::for_module(self.config, module, &handle.source_path, target);

        tracing::info!(module, target = target.as_make_target(), command = %invocation.command_line(), "running make");
        self.emit(BuildEvent::Started {
            module: module.to_string(),
            target,
            command: invocation.command_line(),
        });

        let events = self.events.clone();
        let name = module.to_string();
        let on_line = move |line: &OutputLine| {
            if let Some(tx) = &events {
                let _ = tx.send(BuildEvent::Output {
                    module: name.clone(),
                    line: line.clone(),
                });
            }
        };

        let exit = self.backend.invoke(&invocation, &on_line).await?;

        self.emit(BuildEvent::Finished {
            module: module.to_string(),
            target,
            exit_code: exit.code,
        });

        Ok(BuildResult {
            module: module.to_string(),
            target,
            exit_code: exit.code,
            output: exit.output,
        })
    }

    /// Run `target` over every discovered module
    pub async fn build_all(&self, target: BuildTarget) -> Result<BatchReport, BuildError> {
        self.run_batch(None, target).await
    }

    /// `make clean` over every module; failures are reported as warnings
    pub async fn clean_all(&self) -> Result<BatchReport, BuildError> {
        self.run_batch(None, BuildTarget::Clean).await
    }

    /// Run `target` over one named module or all of them
    pub async fn run_batch(
        &self,
        filter: Option<&str>,
        target: BuildTarget,
    ) -> Result<BatchReport, BuildError> {
        let names = self.registry.list(filter)?;
        let mut report = BatchReport {
            target,
            entries: Vec::with_capacity(names.len()),
        };

        for name in names {
            let result = self.build(&name, target).await?;
            let code = result.exit_code;
            let entry = if result.is_success() {
                match target {
                    BuildTarget::Modules => BatchEntry::Built { module: name },
                    BuildTarget::Clean => BatchEntry::Cleaned { module: name },
                }
            } else if target.is_fatal_on_failure() {
                tracing::error!(module = %name, code = ?code, "module build failed");
                return Err(BuildError::Failed { module: name, code });
            } else {
                tracing::warn!(module = %name, code = ?code, "module {} failed, continuing", target.as_make_target());
                BatchEntry::CleanFailed { module: name, code }
            };
            report.entries.push(entry);
        }

        Ok(report)
    }

    /// Prepare the kernel tree for external module builds
    pub async fn prepare_headers(&self, jobs: usize) -> Result<ProcessExit, BuildError> {
        let invocation = MakeInvocation::modules_prepare(self.config, jobs);
        tracing::info!(command = %invocation.command_line(), "preparing kernel headers");

        let events = self.events.clone();
        let on_line = move |line: &OutputLine| {
            if let Some(tx) = &events {
                let _ = tx.send(BuildEvent::Output {
                    module: PREPARE_LABEL.to_string(),
                    line: line.clone(),
                });
            }
        };

        let exit = self.backend.invoke(&invocation, &on_line).await?;
        if !exit.success() {
            return Err(BuildError::Failed {
                module: PREPARE_LABEL.to_string(),
                code: exit.code,
            });
        }
        Ok(exit)
    }
}
