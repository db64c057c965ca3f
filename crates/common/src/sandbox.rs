//! Path resolution confined to a sandbox root.
//!
//! Every path that reaches the filesystem or a container mount is built by
//! joining a user supplied fragment onto a trusted base. [`resolve`] performs
//! that join lexically and refuses any result that is not the base itself or
//! one of its descendants. Containment is checked component by component, so
//! `/srv/a/bbb` is never considered inside `/srv/a/b`.

use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path {path:?} escapes sandbox root {root}")]
    Traversal { root: PathBuf, path: String },
    #[error("invalid path: {0}")]
    Invalid(String),
    #[error("failed to inspect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SandboxError {
    pub fn is_traversal(&self) -> bool {
        matches!(self, SandboxError::Traversal { .. })
    }
}

/// Join `relative` onto `base` and normalize the result.
///
/// Leading separators on `relative` are ignored, so `"/alice/docs"` and
/// `"alice/docs"` resolve to the same location. The result is either `base`
/// or a strict descendant of it.
pub fn resolve(base: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    if !base.is_absolute() {
        return Err(SandboxError::Invalid(format!(
            "sandbox root {} is not absolute",
            base.display()
        )));
    }
    if relative.contains('\0') {
        return Err(SandboxError::Invalid("path contains a NUL byte".into()));
    }

    let root = normalize(base)?;
    let mut resolved = root.clone();
    let traversal = || SandboxError::Traversal {
        root: root.clone(),
        path: relative.to_string(),
    };

    for component in Path::new(relative.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxError::Invalid(format!(
                    "unexpected root component in {relative:?}"
                )));
            }
        }
    }

    if !resolved.starts_with(&root) {
        return Err(traversal());
    }
    Ok(resolved)
}

/// Like [`resolve`], but the result must be a strict descendant of `base`.
pub fn resolve_strict(base: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    let resolved = resolve(base, relative)?;
    if resolved == normalize(base)? {
        return Err(SandboxError::Invalid(format!(
            "{relative:?} does not name anything below {}",
            base.display()
        )));
    }
    Ok(resolved)
}

/// Whether `path` is `base` or lies below it, compared component-wise.
pub fn is_within(base: &Path, path: &Path) -> bool {
    path.starts_with(base)
}

/// Re-check containment after resolving symlinks.
///
/// The deepest existing ancestor of `path` is canonicalized and must still lie
/// inside the canonical `base`. The non-existent tail is appended unchanged;
/// `path` is expected to be the output of [`resolve`], so the tail holds no
/// `..` components.
pub fn confine_existing(base: &Path, path: &Path) -> Result<PathBuf, SandboxError> {
    let canonical_base = base.canonicalize().map_err(|source| SandboxError::Io {
        path: base.to_path_buf(),
        source,
    })?;

    let existing = path
        .ancestors()
        .find(|ancestor| ancestor.symlink_metadata().is_ok())
        .ok_or_else(|| SandboxError::Invalid(format!("{} has no existing ancestor", path.display())))?;
    let canonical = existing.canonicalize().map_err(|source| SandboxError::Io {
        path: existing.to_path_buf(),
        source,
    })?;

    if !is_within(&canonical_base, &canonical) {
        return Err(SandboxError::Traversal {
            root: canonical_base,
            path: path.display().to_string(),
        });
    }

    match path.strip_prefix(existing) {
        Ok(tail) if !tail.as_os_str().is_empty() => Ok(canonical.join(tail)),
        _ => Ok(canonical),
    }
}

fn normalize(base: &Path) -> Result<PathBuf, SandboxError> {
    let mut out = PathBuf::new();
    for component in base.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return Err(SandboxError::Invalid(format!(
                        "sandbox root {} climbs above /",
                        base.display()
                    )));
                }
            }
        }
    }
    Ok(out)
}
