//! Path helpers shared by the plugins and validation.

use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;

/// Resolve `path` against `context` and normalize `.` and `..` lexically.
pub fn resolve_path(context: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.clean()
    } else {
        context.join(path).clean()
    }
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `target` relative to `base`, both absolute and clean.
pub fn relative_to(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = target.components().collect();
    let common = base
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

/// Keep HTML file names relative to the output directory; html plugins do
/// not handle absolute output names.
pub fn ensure_relative(output_dir: &Path, path: &str) -> String {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        path_string(&relative_to(output_dir, &candidate.clean()))
    } else {
        path.to_string()
    }
}
