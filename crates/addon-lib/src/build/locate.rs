//! Find helper header packages (NAN, node-addon-api, node-api-headers)
//! installed in a project's `node_modules`.

use std::fs;
use std::path::{Path, PathBuf};

fn is_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

fn is_node_project(dir: &Path) -> bool {
    is_file(&dir.join("package.json")) || is_dir(&dir.join("node_modules"))
}

/// From `.../node_modules/<pkg>` (or `.../node_modules/@scope/<pkg>`) to the
/// project that installed it
fn parent_project(dir: &Path) -> Option<PathBuf> {
    let scoped = dir
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('@'))
        .unwrap_or(false);
    let mut up = dir.parent()?;
    if scoped {
        up = up.parent()?;
    }
    up.parent().map(Path::to_path_buf)
}

/// Directory of the NAN package (`node_modules/nan` holding `nan.h`).
///
/// Addons are often dependencies themselves, so when the project has no NAN
/// of its own the search continues in the project that depends on it.
pub fn locate_nan(project_root: &Path) -> Option<PathBuf> {
    let mut dir = project_root.to_path_buf();
    loop {
        if !is_node_project(&dir) {
            return None;
        }
        let nan = dir.join("node_modules").join("nan");
        if is_file(&nan.join("nan.h")) {
            log::debug!("Found NAN in {:?}", nan);
            return Some(nan);
        }
        let up = parent_project(&dir)?;
        if up == dir {
            return None;
        }
        dir = up;
    }
}

fn find_in_node_modules(project_root: &Path, package: &str, probe: &str) -> Option<PathBuf> {
    project_root.ancestors().find_map(|dir| {
        let candidate = dir.join("node_modules").join(package);
        if candidate.join(probe).exists() {
            Some(candidate)
        } else {
            None
        }
    })
}

/// Directory containing `napi.h` from the node-addon-api package
pub fn locate_node_addon_api(project_root: &Path) -> Option<PathBuf> {
    let found = find_in_node_modules(project_root, "node-addon-api", "napi.h");
    if found.is_none() {
        log::debug!("node-addon-api not found from {:?}", project_root);
    }
    found
}

/// Include directory of the node-api-headers package
pub fn locate_node_api_headers(project_root: &Path) -> Option<PathBuf> {
    find_in_node_modules(project_root, "node-api-headers", "include")
        .map(|pkg| pkg.join("include"))
}

/// Module definition file node-api-headers ships for generating `node.lib`
/// on Windows
pub fn locate_node_api_def(project_root: &Path) -> Option<PathBuf> {
    let def = Path::new("def").join("node_api.def");
    find_in_node_modules(project_root, "node-api-headers", &def.to_string_lossy())
        .map(|pkg| pkg.join(&def))
}
