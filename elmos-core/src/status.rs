//! Module status dashboard: build state joined with the insmod/rmmod queue.

use std::fmt::Write as _;

use serde::Serialize;

use crate::error::ModuleError;
use crate::queue::{QueueKind, QueueState};
use crate::registry::ModuleRegistry;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub name: String,
    pub built: bool,
    pub queued_for_insmod: bool,
    pub queued_for_rmmod: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub rows: Vec<StatusRow>,
}

impl StatusReport {
    /// One row per discovered module. Reads only.
    pub fn collect(registry: &ModuleRegistry, queue: &QueueState) -> Result<Self, ModuleError> {
        let rows = registry
            .modules()?
            .into_iter()
            .map(|module| StatusRow {
                built: module.is_built(),
                queued_for_insmod: queue.matches(QueueKind::Insmod, &module.name),
                queued_for_rmmod: queue.matches(QueueKind::Rmmod, &module.name),
                name: module.name,
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fixed-width table:
    ///
    /// ```text
    ///   MODULE               BUILT  INSMOD  RMMOD
    ///   hello                yes    yes     no
    /// ```
    pub fn render_table(&self) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };

        let mut out = String::new();
        let _ = writeln!(out, "  {:<20} {:<6} {:<7} {:<6}", "MODULE", "BUILT", "INSMOD", "RMMOD");
        let _ = writeln!(out, "  {}", "-".repeat(42));
        for row in &self.rows {
            let _ = writeln!(
                out,
                "  {:<20} {:<6} {:<7} {:<6}",
                row.name,
                yes_no(row.built),
                yes_no(row.queued_for_insmod),
                yes_no(row.queued_for_rmmod)
            );
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.rows)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::queue::WILDCARD;

    fn registry(names: &[&str]) -> (tempfile::TempDir, ModuleRegistry) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            let path = dir.path().join(name);
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join("Makefile"), "").unwrap();
        }
        let registry = ModuleRegistry::new(dir.path());
        (dir, registry)
    }

    #[test]
    fn test_wildcard_marks_every_module() {
        let (_dir, registry) = registry(&["a", "b", "c"]);
        let queue = QueueState {
            insmod: vec![WILDCARD.to_string()],
            rmmod: vec![],
        };

        let report = StatusReport::collect(&registry, &queue).unwrap();
        assert_eq!(report.rows.len(), 3);
        assert!(report.rows.iter().all(|r| r.queued_for_insmod));
        assert!(report.rows.iter().all(|r| !r.queued_for_rmmod));
    }

    #[test]
    fn test_built_and_named_queue_flags() {
        let (dir, registry) = registry(&["a", "b"]);
        fs::write(dir.path().join("a/a.ko"), "").unwrap();
        let queue = QueueState {
            insmod: vec!["a".into()],
            rmmod: vec!["b".into()],
        };

        let report = StatusReport::collect(&registry, &queue).unwrap();
        assert_eq!(
            report.rows,
            vec![
                StatusRow {
                    name: "a".into(),
                    built: true,
                    queued_for_insmod: true,
                    queued_for_rmmod: false,
                },
                StatusRow {
                    name: "b".into(),
                    built: false,
                    queued_for_insmod: false,
                    queued_for_rmmod: true,
                },
            ]
        );
    }

    #[test]
    fn test_collect_does_not_touch_queue_file() {
        let (dir, registry) = registry(&["a"]);
        StatusReport::collect(&registry, &QueueState::default()).unwrap();
        assert!(!dir.path().join(".elmos-queue").exists());
    }

    #[test]
    fn test_render_table_columns() {
        let report = StatusReport {
            rows: vec![StatusRow {
                name: "hello".into(),
                built: true,
                queued_for_insmod: false,
                queued_for_rmmod: true,
            }],
        };
        let table = report.render_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0].trim_end(), "  MODULE               BUILT  INSMOD  RMMOD");
        assert_eq!(lines[2].trim_end(), "  hello                yes    no      yes");
    }

    #[test]
    fn test_json_rows() {
        let report = StatusReport {
            rows: vec![StatusRow {
                name: "hello".into(),
                built: false,
                queued_for_insmod: true,
                queued_for_rmmod: false,
            }],
        };
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value[0]["name"], "hello");
        assert_eq!(value[0]["queued_for_insmod"], true);
    }
}
