//! Argument safety checks
//!
//! Revisions, paths and object types end up as literal arguments of store
//! commands. Anything git could read as an option must be refused first.

use crate::storage::{Result, StorageError};

/// Returns an error if `arg` could be interpreted as a command line option
/// or cannot be passed as a process argument at all.
pub fn check_arg_safety(arg: &str) -> Result<()> {
    if arg.starts_with('-') || arg.contains('\0') {
        return Err(StorageError::UnsafeArgument(arg.to_string()));
    }
    Ok(())
}

/// Check several arguments, stopping at the first unsafe one.
pub fn check_args_safety<'a>(args: impl IntoIterator<Item = &'a str>) -> Result<()> {
    args.into_iter().try_for_each(check_arg_safety)
}

/// Returns why `path` cannot name a tree entry, if it cannot.
///
/// Every component must be a plain name: not empty, not `.` or `..`, and not
/// `.git` in any letter case.
pub fn check_tree_path(path: &str) -> std::result::Result<(), String> {
    if path.is_empty() {
        return Err("empty path".to_string());
    }
    for component in path.split('/') {
        match component {
            "" => return Err(format!("empty component in {:?}", path)),
            "." | ".." => return Err(format!("{:?} component in {:?}", component, path)),
            name if name.eq_ignore_ascii_case(".git") => {
                return Err(format!("{:?} component in {:?}", name, path));
            }
            _ => {}
        }
    }
    Ok(())
}
