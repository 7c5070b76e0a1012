//! Path helpers: environment variable expansion and resolution against a
//! working directory.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::env;
use std::path::{Component, Path, PathBuf};

lazy_static! {
    /// `%NAME%`, `${NAME}` and `$NAME` references
    static ref ENV_VAR_REGEX: Regex = Regex::new(
        r"%([A-Za-z_][A-Za-z0-9_()]*)%|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)"
    ).unwrap();
}

/// Expand environment variables; unknown variables are left as written
pub fn expand_env(text: &str) -> String {
    expand_with(text, |name| env::var(name).ok())
}

/// Expand variable references using `lookup`
pub fn expand_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_VAR_REGEX
        .replace_all(text, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Expand variables in `path` and make it absolute relative to `base`
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let expanded = PathBuf::from(expand_env(path.trim()));
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    normalize(&joined)
}

/// Remove `.` and `..` components without touching the file system
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Absolute form of `path`, relative to the current directory when needed
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    Ok(normalize(&env::current_dir()?.join(path)))
}
