//! On-disk queue format
//!
//! The file is sourced by the emulator-launch step, so it is a pair of shell
//! array assignments:
//!
//! ```text
//! # Auto-generated by elmos. Do not edit.
//! MODULE_INS=("hello" "all")
//! MODULE_REM=()
//! ```
//!
//! It is rewritten in full on every save. Loading ignores anything it does not
//! recognise. A value listed in both arrays keeps only the later assignment.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::QueueError;
use crate::queue::{QueueKind, QueueState};

/// First line of every generated file
pub const HEADER: &str = "# Auto-generated by elmos. Do not edit.";

/// Persistent store for a [`QueueState`]
#[derive(Clone, Debug)]
pub struct QueueFile {
    path: PathBuf,
}

impl QueueFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state; a missing file is an empty state
    pub fn load(&self) -> Result<QueueState, QueueError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(QueueState::default()),
            Err(source) => Err(QueueError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Write the whole state, replacing the previous file
    pub fn save(&self, state: &QueueState) -> Result<(), QueueError> {
        let persist = |source: io::Error| QueueError::Persist {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(persist)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, render(state)).map_err(persist)?;
        fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            persist(source)
        })?;

        tracing::debug!(path = %self.path.display(), "queue saved");
        Ok(())
    }
}

/// Serialize a state into the file format
pub fn render(state: &QueueState) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    for kind in [QueueKind::Insmod, QueueKind::Rmmod] {
        let entries: Vec<String> = state.queue(kind).iter().map(|v| quote(v)).collect();
        out.push_str(&format!("{}=({})\n", kind.var_name(), entries.join(" ")));
    }
    out
}

/// Parse the file format, ignoring unknown content
pub fn parse(content: &str) -> QueueState {
    let mut state = QueueState::default();
    let mut last = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let kind = match name.trim() {
            "MODULE_INS" => QueueKind::Insmod,
            "MODULE_REM" => QueueKind::Rmmod,
            _ => continue,
        };

        let value = value.trim();
        let Some(inner) = value.strip_prefix('(') else {
            continue;
        };
        let inner = inner.strip_suffix(')').unwrap_or(inner);

        let mut entries: Vec<String> = Vec::new();
        for word in split_words(inner) {
            if !word.is_empty() && !entries.contains(&word) {
                entries.push(word);
            }
        }

        *state.queue_mut(kind) = entries;
        last = Some(kind);
    }

    if let Some(kind) = last {
        let later = state.queue(kind).to_vec();
        state
            .queue_mut(kind.opposite())
            .retain(|v| !later.contains(v));
    }

    state
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Split shell-style words: double quotes (with backslash escapes), single
/// quotes, or bare words separated by whitespace.
fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '"' => {
                    while let Some(c) = chars.next() {
                        match c {
                            '"' => break,
                            '\\' => {
                                if let Some(escaped) = chars.next() {
                                    word.push(escaped);
                                }
                            }
                            _ => word.push(c),
                        }
                    }
                }
                '\'' => {
                    for c in chars.by_ref() {
                        if c == '\'' {
                            break;
                        }
                        word.push(c);
                    }
                }
                _ => word.push(c),
            }
        }
        words.push(word);
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::WILDCARD;

    fn state(ins: &[&str], rem: &[&str]) -> QueueState {
        QueueState {
            insmod: ins.iter().map(|s| s.to_string()).collect(),
            rmmod: rem.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_render_exact_shape() {
        let rendered = render(&state(&["hello", WILDCARD], &[]));
        assert_eq!(
            rendered,
            "# Auto-generated by elmos. Do not edit.\nMODULE_INS=(\"hello\" \"all\")\nMODULE_REM=()\n"
        );
    }

    #[test]
    fn test_save_load_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let file = QueueFile::new(dir.path().join("nested/queue"));

        for s in [
            state(&[], &[]),
            state(&["one"], &[]),
            state(&["c", "a", WILDCARD, "b"], &["x", "y"]),
        ] {
            file.save(&s).unwrap();
            assert_eq!(file.load().unwrap(), s);
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = QueueFile::new(dir.path().join("absent"));
        assert_eq!(file.load().unwrap(), QueueState::default());
    }

    #[test]
    fn test_parse_tolerates_older_and_unknown_content() {
        let content = r#"
#!/bin/bash
# written by hand
EXTRA_FLAGS="-v"
MODULE_INS=( hello 'world' "all" hello )
MODULE_OTHER=("ignored")
garbage line without equals
MODULE_REM=("bye")
"#;
        let parsed = parse(content);
        assert_eq!(parsed.insmod, vec!["hello", "world", "all"]);
        assert_eq!(parsed.rmmod, vec!["bye"]);
    }

    #[test]
    fn test_parse_keeps_queues_exclusive() {
        let parsed = parse("MODULE_INS=(\"a\" \"b\")\nMODULE_REM=(\"a\")\n");
        assert_eq!(parsed.insmod, vec!["b"]);
        assert_eq!(parsed.rmmod, vec!["a"]);

        let parsed = parse("MODULE_REM=(\"all\")\nMODULE_INS=(\"all\" \"x\")\n");
        assert_eq!(parsed.insmod, vec!["all", "x"]);
        assert!(parsed.rmmod.is_empty());
    }

    #[test]
    fn test_quoting_escapes_shell_characters() {
        let s = state(&["we\"ird$name"], &[]);
        let rendered = render(&s);
        assert!(rendered.contains(r#"MODULE_INS=("we\"ird\$name")"#));
        assert_eq!(parse(&rendered), s);
    }

    #[test]
    fn test_save_failure_is_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let file = QueueFile::new(blocker.join("queue"));

        let err = file.save(&QueueState::default()).unwrap_err();
        assert!(matches!(err, QueueError::Persist { .. }));
    }
}
