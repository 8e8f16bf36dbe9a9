use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Config file names searched in each directory, in order
pub const CONFIG_FILE_NAMES: [&str; 4] = ["elmos.yaml", "elmos.yml", ".elmos.yaml", ".elmos.yml"];

/// Environment variable that points at an explicit config file
pub const CONFIG_ENV_VAR: &str = "ELMOS_CONFIG";

/// Queue file name used when `paths.queue_file` is not set
pub const DEFAULT_QUEUE_FILE: &str = ".elmos-queue";

/// Filesystem locations the tool works against
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Kernel source tree that modules are built against
    pub kernel_dir: PathBuf,

    /// Directory holding one sub-directory per module
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,

    /// Insmod/rmmod queue file (defaults to `<modules_dir>/.elmos-queue`)
    #[serde(default)]
    pub queue_file: Option<PathBuf>,
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("modules")
}

/// Toolchain settings passed through to `make` verbatim
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Kernel `ARCH=` value
    #[serde(default = "default_arch")]
    pub arch: String,

    /// `CROSS_COMPILE=` prefix (omitted when empty)
    #[serde(default)]
    pub cross_compile: String,

    /// Pass `LLVM=1`
    #[serde(default = "default_true")]
    pub llvm: bool,

    /// `HOSTCFLAGS=` value (omitted when empty)
    #[serde(default)]
    pub host_cflags: String,

    /// Parallel jobs for kernel-tree targets; host CPU count when unset
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Extra environment for every `make` invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_arch() -> String {
    "arm64".into()
}
fn default_true() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            arch: default_arch(),
            cross_compile: String::new(),
            llvm: true,
            host_cflags: String::new(),
            jobs: None,
            env: BTreeMap::new(),
        }
    }
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ElmosConfig {
    /// Config file version
    #[serde(default = "default_version")]
    pub version: String,

    pub paths: PathsConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

fn default_version() -> String {
    "1".into()
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {field} {reason}")]
    Invalid { field: String, reason: String },
    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

impl ElmosConfig {
    /// Build a config in code (used by `init` and tests)
    pub fn new(kernel_dir: impl Into<PathBuf>, modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            version: default_version(),
            paths: PathsConfig {
                kernel_dir: kernel_dir.into(),
                modules_dir: modules_dir.into(),
                queue_file: None,
            },
            build: BuildConfig::default(),
        }
    }

    /// Load configuration from a file; relative paths resolve against its directory
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Load configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ElmosConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let mut searched = Vec::new();

        // Check environment variable first
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        // Search current directory and parents
        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    /// Serialize back to YAML (used by `init`)
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.kernel_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "paths.kernel_dir".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.paths.modules_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "paths.modules_dir".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.build.jobs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "build.jobs".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Make every relative path absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let absolutize = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        absolutize(&mut self.paths.kernel_dir);
        absolutize(&mut self.paths.modules_dir);
        if let Some(queue) = self.paths.queue_file.as_mut() {
            absolutize(queue);
        }
    }

    pub fn kernel_dir(&self) -> &Path {
        &self.paths.kernel_dir
    }

    pub fn modules_dir(&self) -> &Path {
        &self.paths.modules_dir
    }

    /// Where the insmod/rmmod queue lives
    pub fn queue_file(&self) -> PathBuf {
        match &self.paths.queue_file {
            Some(path) => path.clone(),
            None => self.paths.modules_dir.join(DEFAULT_QUEUE_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
paths:
  kernel_dir: /Volumes/elmos/linux
"#;
        let config = ElmosConfig::from_str(yaml).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.modules_dir(), Path::new("modules"));
        assert_eq!(config.build.arch, "arm64");
        assert!(config.build.llvm);
        assert!(config.build.cross_compile.is_empty());
        assert_eq!(config.queue_file(), PathBuf::from("modules/.elmos-queue"));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
version: "1"
paths:
  kernel_dir: linux
  modules_dir: mods
  queue_file: state/queue.sh
build:
  arch: riscv
  cross_compile: riscv64-linux-gnu-
  llvm: false
  host_cflags: "-I/opt/homebrew/include"
  jobs: 8
  env:
    PATH: /opt/llvm/bin:/usr/bin
"#;
        let config = ElmosConfig::from_str(yaml).unwrap();
        assert_eq!(config.build.arch, "riscv");
        assert_eq!(config.build.cross_compile, "riscv64-linux-gnu-");
        assert!(!config.build.llvm);
        assert_eq!(config.build.jobs, Some(8));
        assert_eq!(config.build.env.get("PATH").unwrap(), "/opt/llvm/bin:/usr/bin");
        assert_eq!(config.queue_file(), PathBuf::from("state/queue.sh"));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let yaml = r#"
paths:
  kernel_dir: linux
build:
  jobs: 0
"#;
        let result = ElmosConfig::from_str(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_missing_kernel_dir_is_yaml_error() {
        let result = ElmosConfig::from_str("build:\n  arch: x86_64\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elmos.yaml");
        std::fs::write(
            &path,
            "paths:\n  kernel_dir: linux\n  modules_dir: /abs/modules\n",
        )
        .unwrap();

        let config = ElmosConfig::load(&path).unwrap();
        assert_eq!(config.kernel_dir(), dir.path().join("linux"));
        assert_eq!(config.modules_dir(), Path::new("/abs/modules"));
        assert_eq!(
            config.queue_file(),
            PathBuf::from("/abs/modules").join(DEFAULT_QUEUE_FILE)
        );
    }

    #[test]
    fn test_discover_walks_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".elmos.yml"), "paths:\n  kernel_dir: linux\n").unwrap();

        let (found, config) = ElmosConfig::discover(&nested).unwrap();
        assert_eq!(found, dir.path().join(".elmos.yml"));
        assert_eq!(config.kernel_dir(), dir.path().join("linux"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = ElmosConfig::new("/src/linux", "/src/modules");
        let yaml = config.to_yaml().unwrap();
        let parsed = ElmosConfig::from_str(&yaml).unwrap();
        assert_eq!(parsed.kernel_dir(), Path::new("/src/linux"));
        assert_eq!(parsed.modules_dir(), Path::new("/src/modules"));
    }
}
