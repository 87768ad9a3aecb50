//! Environment-style `KEY=value` configuration files.
use crate::error::{BootstrapError, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: BTreeMap<String, String>,
}

impl EnvFile {
    /// Parse `KEY=value` lines. Blank lines and `#` comments are ignored,
    /// a leading `export ` is accepted, and matching quotes are stripped.
    pub fn parse(content: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            entries.insert(key.to_string(), unquote(value.trim()).to_string());
        }
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Load when present; an absent file is an empty map.
    pub fn load_optional(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from `required` that are absent or empty.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|key| self.get(key).map_or(true, |v| v.is_empty()))
            .map(String::as_str)
            .collect()
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    // Trailing inline comment on an unquoted value
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end(),
        None => value,
    }
}

/// Result of [`materialize_from_template`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    /// Target already existed and was left untouched
    AlreadyPresent,
    /// Target was created from the template
    Created,
    /// Neither target nor template exists
    NoTemplate,
}

/// Copy `template` to `target` if `target` does not exist.
///
/// The copy is written to a temporary file in the target directory and then
/// renamed into place without clobbering, so the target is either absent or
/// complete, and an existing file is never overwritten.
pub fn materialize_from_template(template: &Path, target: &Path) -> Result<Materialized> {
    if target.exists() {
        return Ok(Materialized::AlreadyPresent);
    }
    if !template.exists() {
        return Ok(Materialized::NoTemplate);
    }

    let content = std::fs::read(template)?;
    let dir = target.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&content)?;
    tmp.as_file().sync_all()?;

    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(Materialized::Created),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            // Lost a race with another writer; theirs wins
            Ok(Materialized::AlreadyPresent)
        }
        Err(e) => Err(BootstrapError::Io(std::io::Error::other(format!(
            "Failed to move {} into place: {}",
            target.display(),
            e.error
        )))),
    }
}
