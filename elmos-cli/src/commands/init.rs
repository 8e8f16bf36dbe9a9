//! `elmos init` command - writes a starter elmos.yaml

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use elmos_core::config::{CONFIG_FILE_NAMES, ElmosConfig};

/// Run the init command in the current directory
pub fn run_init(yes: bool, kernel_dir: PathBuf, arch: Option<String>) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let path = init_in(&cwd, yes, kernel_dir, arch)?;

    println!("Created: {}\n", path.display());
    println!("Next steps:");
    println!("  1. Review build.arch and build.cross_compile in elmos.yaml");
    println!("  2. Run `elmos doctor` to check your toolchain");
    println!("  3. Run `elmos module <name> --new` to scaffold a module");

    Ok(())
}

fn init_in(
    dir: &Path,
    yes: bool,
    kernel_dir: PathBuf,
    arch: Option<String>,
) -> anyhow::Result<PathBuf> {
    // Check if config already exists
    for name in &CONFIG_FILE_NAMES {
        let existing = dir.join(name);
        if existing.exists() {
            if !yes {
                anyhow::bail!(
                    "Config file {} already exists. Use --yes to overwrite.",
                    existing.display()
                );
            }
            println!("Overwriting existing config: {}", existing.display());
        }
    }

    let mut config = ElmosConfig::new(kernel_dir, "modules");
    if let Some(arch) = arch {
        config.build.arch = arch;
    }

    let mut yaml = String::from("# elmos workspace configuration\n");
    yaml.push_str("# Relative paths are resolved against this file's directory.\n");
    yaml.push_str(&config.to_yaml()?);

    let output_path = dir.join(CONFIG_FILE_NAMES[0]);
    fs::write(&output_path, &yaml)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    let modules_dir = dir.join(config.modules_dir());
    fs::create_dir_all(&modules_dir)
        .with_context(|| format!("failed to create {}", modules_dir.display()))?;

    tracing::info!(path = %output_path.display(), "wrote config");
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_in(dir.path(), false, PathBuf::from("linux"), Some("riscv".into())).unwrap();

        let config = ElmosConfig::load(&path).unwrap();
        assert_eq!(config.build.arch, "riscv");
        assert_eq!(config.kernel_dir(), dir.path().join("linux"));
        assert!(dir.path().join("modules").is_dir());
    }

    #[test]
    fn test_init_refuses_overwrite_without_yes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".elmos.yml"), "paths:\n  kernel_dir: x\n").unwrap();

        assert!(init_in(dir.path(), false, PathBuf::from("linux"), None).is_err());
        assert!(init_in(dir.path(), true, PathBuf::from("linux"), None).is_ok());
    }
}
