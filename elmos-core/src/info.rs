//! Module metadata from the `MODULE_*` macros in `<name>.c`.

use std::fs;

use crate::error::ModuleError;
use crate::registry::ModuleRegistry;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub license: Option<String>,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub version: Option<String>,
}

impl ModuleInfo {
    /// Read metadata for a named module
    pub fn read(registry: &ModuleRegistry, name: &str) -> Result<Self, ModuleError> {
        let module = registry.find(name)?;
        let path = module.source_file();
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModuleError::SourceMissing {
                    name: name.to_string(),
                    path,
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::parse(name, &source))
    }

    /// Extract metadata from C source text
    pub fn parse(name: &str, source: &str) -> Self {
        let mut info = ModuleInfo {
            name: name.to_string(),
            ..Default::default()
        };

        for line in source.lines() {
            let line = line.trim_start();
            if line.starts_with("MODULE_LICENSE") {
                info.license = info.license.or_else(|| quoted_value(line));
            } else if line.starts_with("MODULE_AUTHOR") {
                info.authors.extend(quoted_value(line));
            } else if line.starts_with("MODULE_DESCRIPTION") {
                info.description = info.description.or_else(|| quoted_value(line));
            } else if line.starts_with("MODULE_VERSION") {
                info.version = info.version.or_else(|| quoted_value(line));
            }
        }

        info
    }
}

/// Text between the first and last double quote on a line
fn quoted_value(line: &str) -> Option<String> {
    let start = line.find('"')?;
    let end = line.rfind('"')?;
    if end > start {
        Some(line[start + 1..end].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
#include <linux/module.h>

MODULE_LICENSE("GPL");
MODULE_AUTHOR("Ada Lovelace <ada@example.org>");
MODULE_AUTHOR("Grace Hopper");
MODULE_DESCRIPTION("Says \"hello\" on load");
"#;

    #[test]
    fn test_parse_macros() {
        let info = ModuleInfo::parse("hello", SOURCE);
        assert_eq!(info.license.as_deref(), Some("GPL"));
        assert_eq!(
            info.authors,
            vec!["Ada Lovelace <ada@example.org>", "Grace Hopper"]
        );
        assert_eq!(info.description.as_deref(), Some("Says \\\"hello\\\" on load"));
        assert_eq!(info.version, None);
    }

    #[test]
    fn test_unterminated_macro_is_ignored() {
        let info = ModuleInfo::parse("x", "MODULE_LICENSE(\"GPL);\n");
        assert_eq!(info.license, None);
    }

    #[test]
    fn test_read_reports_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bare")).unwrap();
        fs::write(dir.path().join("bare/Makefile"), "obj-m += bare.o\n").unwrap();
        let registry = ModuleRegistry::new(dir.path());

        let err = ModuleInfo::read(&registry, "bare").unwrap_err();
        assert!(matches!(err, ModuleError::SourceMissing { .. }));
        let err = ModuleInfo::read(&registry, "ghost").unwrap_err();
        assert!(matches!(err, ModuleError::NotFound { .. }));
    }

    #[test]
    fn test_read_scaffolded_module() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModuleRegistry::new(dir.path());
        registry.create("hello").unwrap();

        let info = ModuleInfo::read(&registry, "hello").unwrap();
        assert_eq!(info.license.as_deref(), Some("GPL"));
        assert_eq!(info.version.as_deref(), Some("1.0"));
        assert_eq!(info.description.as_deref(), Some("A simple kernel module"));
    }
}
