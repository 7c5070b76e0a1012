//! Directory steps used before and after compilation.

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{StepAction, StepScope};
use crate::context::BuildContext;
use crate::logger::BuildLoggerLevel;

/// Creates directories; relative paths resolve against the working directory
#[derive(Debug, Clone, Default)]
pub struct StepDirectoryCreate {
    pub directories: Vec<String>,
}

impl StepDirectoryCreate {
    pub fn new<I, S>(directories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            directories: directories.into_iter().map(Into::into).collect(),
        }
    }
}

impl StepAction for StepDirectoryCreate {
    fn kind(&self) -> &'static str {
        "StepDirectoryCreate"
    }

    fn execute(&mut self, _ctx: &mut BuildContext, scope: &StepScope<'_>) -> Result<bool> {
        for directory in &self.directories {
            let path = scope.expand_path(directory);
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory {}", path.display()))?;
            debug!("Created directory {}", path.display());
        }
        Ok(true)
    }
}

/// Deletes directories when they exist
#[derive(Debug, Clone, Default)]
pub struct StepDirectoryDelete {
    pub directories: Vec<String>,
}

impl StepDirectoryDelete {
    pub fn new<I, S>(directories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            directories: directories.into_iter().map(Into::into).collect(),
        }
    }
}

impl StepAction for StepDirectoryDelete {
    fn kind(&self) -> &'static str {
        "StepDirectoryDelete"
    }

    fn execute(&mut self, _ctx: &mut BuildContext, scope: &StepScope<'_>) -> Result<bool> {
        for directory in &self.directories {
            let path = scope.expand_path(directory);
            if !path.is_dir() {
                continue;
            }
            clear_readonly(&path)?;
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to delete directory {}", path.display()))?;
            debug!("Deleted directory {}", path.display());
        }
        Ok(true)
    }
}

/// Read-only files block deletion on Windows
fn clear_readonly(path: &Path) -> Result<()> {
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        let metadata = entry.metadata()?;
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(entry.path(), permissions)?;
        }
    }
    Ok(())
}

/// Copies directory trees or glob matches to a destination, overwriting
/// existing files
#[derive(Debug, Clone, Default)]
pub struct StepDirectoryCopy {
    /// (source directory or glob pattern, destination directory)
    pub copies: Vec<(String, String)>,
    pub recursive: bool,
}

impl StepDirectoryCopy {
    pub fn new() -> Self {
        Self {
            copies: Vec::new(),
            recursive: true,
        }
    }

    pub fn add(&mut self, source: impl Into<String>, destination: impl Into<String>) {
        self.copies.push((source.into(), destination.into()));
    }

    fn copy_tree(&self, source: &Path, destination: &Path) -> Result<usize> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut copied = 0;
        for entry in WalkDir::new(source).max_depth(max_depth) {
            let entry = entry.with_context(|| format!("Failed to read {}", source.display()))?;
            let relative = entry.path().strip_prefix(source)?;
            let target = destination.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                copy_file(entry.path(), &target)?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if target.exists() {
        let mut permissions = fs::metadata(target)?.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(target, permissions)?;
        }
    }
    fs::copy(source, target)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;
    Ok(())
}

fn is_pattern(source: &str) -> bool {
    source.contains(['*', '?', '['])
}

impl StepAction for StepDirectoryCopy {
    fn kind(&self) -> &'static str {
        "StepDirectoryCopy"
    }

    fn execute(&mut self, ctx: &mut BuildContext, scope: &StepScope<'_>) -> Result<bool> {
        let mut copied = 0;
        for (source, destination) in &self.copies {
            let destination = scope.expand_path(destination);
            if is_pattern(source) {
                let pattern = scope.expand_path(source);
                let pattern = pattern.to_string_lossy();
                let matches: Vec<PathBuf> = glob::glob(&pattern)
                    .with_context(|| format!("Invalid copy pattern {}", pattern))?
                    .filter_map(|entry| entry.ok())
                    .collect();
                for path in matches {
                    let Some(file_name) = path.file_name() else {
                        continue;
                    };
                    let target = destination.join(file_name);
                    if path.is_dir() {
                        copied += self.copy_tree(&path, &target)?;
                    } else {
                        copy_file(&path, &target)?;
                        copied += 1;
                    }
                }
            } else {
                let source = scope.expand_path(source);
                if !source.exists() {
                    ctx.log(
                        &format!("The copy source '{}' does not exist.", source.display()),
                        BuildLoggerLevel::Warn,
                    );
                    continue;
                }
                if source.is_dir() {
                    copied += self.copy_tree(&source, &destination)?;
                } else if let Some(file_name) = source.file_name() {
                    copy_file(&source, &destination.join(file_name))?;
                    copied += 1;
                }
            }
        }
        debug!("Copied {} files", copied);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::BuildStep;
    use crate::testing::test_context;
    use tempfile::TempDir;

    fn run(action: impl StepAction + 'static, working_dir: &Path) -> bool {
        let (mut ctx, _log) = test_context();
        let mut step = BuildStep::new("Dirs", action).with_working_dir(working_dir);
        assert!(step.initialize(&mut ctx));
        step.execute(&mut ctx).unwrap()
    }

    #[test]
    fn test_create_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        assert!(run(StepDirectoryCreate::new(["Output/icons", "Intellisense"]), root));
        assert!(root.join("Output/icons").is_dir());
        assert!(root.join("Intellisense").is_dir());

        fs::write(root.join("Output/icons/logo.gif"), "gif").unwrap();
        assert!(run(StepDirectoryDelete::new(["Output", "Missing"]), root));
        assert!(!root.join("Output").exists());
        assert!(root.join("Intellisense").is_dir());
    }

    #[test]
    fn test_copy_tree_and_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let styles = root.join("Presentation/Vs2005/styles");
        fs::create_dir_all(styles.join("nested")).unwrap();
        fs::write(styles.join("main.css"), "body{}").unwrap();
        fs::write(styles.join("nested/print.css"), "@media print{}").unwrap();
        fs::write(root.join("Presentation/Vs2005/a.js"), "a").unwrap();
        fs::write(root.join("Presentation/Vs2005/b.js"), "b").unwrap();

        let mut copy = StepDirectoryCopy::new();
        copy.add("Presentation/Vs2005/styles", "Output/styles");
        copy.add("Presentation/Vs2005/*.js", "Output/scripts");
        copy.add("Presentation/Vs2005/missing", "Output/missing");
        assert!(run(copy, root));

        assert!(root.join("Output/styles/main.css").is_file());
        assert!(root.join("Output/styles/nested/print.css").is_file());
        assert!(root.join("Output/scripts/a.js").is_file());
        assert!(root.join("Output/scripts/b.js").is_file());
        assert!(!root.join("Output/missing").exists());
    }
}
