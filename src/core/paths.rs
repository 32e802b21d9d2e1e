//! Path resolution for files referenced by project and scenario configuration.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Environment variable naming the CI checkout root.
pub const PROJECT_ROOT_ENV: &str = "CI_PROJECT_DIR";

/// Root against which project-relative paths are resolved: `CI_PROJECT_DIR`
/// when set and non-empty, else the current directory.
pub fn project_root() -> PathBuf {
    project_root_from(env::var(PROJECT_ROOT_ENV).ok().as_deref())
}

fn project_root_from(ci_dir: Option<&str>) -> PathBuf {
    match ci_dir.map(str::trim).filter(|s| !s.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Resolve a project-relative path to an absolute, normalized path.
pub fn resolve_project_relative(path: &Path) -> PathBuf {
    resolve_against(&project_root(), path)
}

/// Resolve `path` against `base` when it is relative.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components. Otherwise `..`/`.` are resolved syntactically.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
