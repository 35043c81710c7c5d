//! Locates a real weight container for tests through an environment variable.

use std::{
    env::var_os,
    ffi::OsStr,
    fs::canonicalize,
    path::{Path, PathBuf},
};

/// Reads `TEST_WEIGHTS` and resolves it with [resolve].
pub fn find() -> Option<PathBuf> {
    resolve(&var_os("TEST_WEIGHTS")?)
}

/// Resolves `path` as given, then relative to the workspace root; `None` if neither exists.
pub fn resolve(path: &OsStr) -> Option<PathBuf> {
    canonicalize(path)
        .or_else(|_| canonicalize(workspace_root().join(path)))
        .ok()
}

/// The directory holding the workspace manifest.
pub fn workspace_root() -> &'static Path {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // this crate sits directly under the workspace root
    manifest_dir.parent().unwrap_or(manifest_dir)
}

#[test]
fn test_workspace_root() {
    let root = workspace_root();
    assert!(root.join("Cargo.toml").is_file());
    assert!(root.join("common").join("Cargo.toml").is_file());
}

#[test]
fn test_resolve() {
    // relative to the workspace, whatever the working directory
    let path = resolve("common/src/test_weights.rs".as_ref()).unwrap();
    assert!(path.is_absolute());
    assert!(path.ends_with("common/src/test_weights.rs"));

    // absolute paths resolve to themselves
    let manifest = canonicalize(workspace_root().join("Cargo.toml")).unwrap();
    assert_eq!(resolve(manifest.as_os_str()), Some(manifest.clone()));

    assert_eq!(resolve("no/such/weights.pict".as_ref()), None);
}

#[test]
fn test_find() {
    match var_os("TEST_WEIGHTS") {
        Some(_) => assert!(find().map_or(true, |path| path.is_absolute())),
        None => assert_eq!(find(), None),
    }
}
