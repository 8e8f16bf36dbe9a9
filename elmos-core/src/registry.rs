//! Module registry
//!
//! A module is a directory under the modules root that contains a `Makefile`.
//! Nothing is cached: every call looks at the filesystem again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ModuleError;
use crate::queue::WILDCARD;

/// File whose presence marks a directory as a module
pub const BUILD_DESCRIPTOR: &str = "Makefile";

/// A module project on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub source_path: PathBuf,
    pub artifact_path: PathBuf,
}

impl Module {
    fn at(root: &Path, name: &str) -> Self {
        let source_path = root.join(name);
        let artifact_path = source_path.join(format!("{}.ko", name));
        Self {
            name: name.to_string(),
            source_path,
            artifact_path,
        }
    }

    /// `<dir>/<name>.c`
    pub fn source_file(&self) -> PathBuf {
        self.source_path.join(format!("{}.c", self.name))
    }

    /// Whether the `.ko` exists right now
    pub fn is_built(&self) -> bool {
        self.artifact_path.is_file()
    }
}

#[derive(Clone, Debug)]
pub struct ModuleRegistry {
    root: PathBuf,
}

impl ModuleRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Module handle for a name, without checking that it exists
    pub fn module(&self, name: &str) -> Module {
        Module::at(&self.root, name)
    }

    /// Names of the selected modules.
    ///
    /// With a filter, the named directory must exist or `NotFound` is returned.
    /// Without one, every sub-directory holding a `Makefile` is listed, sorted by name.
    pub fn list(&self, filter: Option<&str>) -> Result<Vec<String>, ModuleError> {
        if let Some(name) = filter {
            return self.find(name).map(|m| vec![m.name]);
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(root = %self.root.display(), "modules directory does not exist");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(ModuleError::ScanFailed {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ModuleError::ScanFailed {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_dir() || !path.join(BUILD_DESCRIPTOR).is_file() {
                continue;
            }
            // Names must survive the queue file and the make command line
            match entry.file_name().to_str() {
                Some(name) if validate_name(name).is_ok() => names.push(name.to_string()),
                _ => tracing::debug!(path = %path.display(), "skipping unusable module directory name"),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Every discovered module
    pub fn modules(&self) -> Result<Vec<Module>, ModuleError> {
        Ok(self
            .list(None)?
            .iter()
            .map(|name| self.module(name))
            .collect())
    }

    /// Look up one module by name
    pub fn find(&self, name: &str) -> Result<Module, ModuleError> {
        validate_name(name)?;
        let module = self.module(name);
        if module.source_path.join(BUILD_DESCRIPTOR).is_file() {
            Ok(module)
        } else {
            Err(ModuleError::not_found(name))
        }
    }

    /// Scaffold a new module directory with a source file and Makefile
    pub fn create(&self, name: &str) -> Result<Module, ModuleError> {
        validate_name(name)?;
        if name == WILDCARD {
            return Err(ModuleError::invalid_name(
                name,
                "reserved for the insmod/rmmod wildcard",
            ));
        }

        let module = self.module(name);
        if module.source_path.exists() {
            return Err(ModuleError::AlreadyExists {
                name: name.to_string(),
            });
        }

        fs::create_dir_all(&module.source_path)?;
        fs::write(module.source_file(), source_template(name))?;
        fs::write(
            module.source_path.join(BUILD_DESCRIPTOR),
            makefile_template(name),
        )?;

        tracing::info!(module = name, path = %module.source_path.display(), "created module");
        Ok(module)
    }
}

fn validate_name(name: &str) -> Result<(), ModuleError> {
    if name.is_empty() {
        return Err(ModuleError::invalid_name(name, "name is empty"));
    }
    if name == "." || name == ".." {
        return Err(ModuleError::invalid_name(name, "not a directory name"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ModuleError::invalid_name(name, "contains a path separator"));
    }
    if name.chars().any(char::is_control) {
        return Err(ModuleError::invalid_name(name, "contains a control character"));
    }
    Ok(())
}

fn source_template(name: &str) -> String {
    format!(
        r#"// SPDX-License-Identifier: GPL-2.0
/*
 * {name} - Kernel module
 */

#include <linux/init.h>
#include <linux/module.h>
#include <linux/kernel.h>

static int __init {name}_init(void)
{{
    pr_info("{name}: Module loaded\n");
    return 0;
}}

static void __exit {name}_exit(void)
{{
    pr_info("{name}: Module unloaded\n");
}}

module_init({name}_init);
module_exit({name}_exit);

MODULE_LICENSE("GPL");
MODULE_AUTHOR("Your Name");
MODULE_DESCRIPTION("A simple kernel module");
MODULE_VERSION("1.0");
"#
    )
}

fn makefile_template(name: &str) -> String {
    format!(
        "obj-m += {name}.o\n\n# Optional: add extra source files\n# {name}-objs := {name}.o helper.o\n"
    )
}
