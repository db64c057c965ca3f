//! Overlay mount descriptions.
//!
//! An [`OverlayMount`] names the three host directories an overlay needs and
//! the location it should appear at inside a container. Values can only be
//! built through [`OverlayMount::new`], which checks the layer layout, so a
//! runtime adapter can serialize one without re-validating it.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::sandbox::is_within;

/// Characters that terminate an entry in the overlay option string or in a
/// runtime's comma separated mount syntax.
const RESERVED_CHARS: &[char] = &[',', ':', '"', '\n'];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OverlayError {
    #[error("{role} path {path} is not absolute")]
    NotAbsolute { role: &'static str, path: PathBuf },
    #[error("{role} path {path} contains a reserved character")]
    ReservedCharacter { role: &'static str, path: PathBuf },
    #[error("{inner} layer {inner_path} overlaps {outer} layer {outer_path}")]
    Overlap {
        inner: &'static str,
        inner_path: PathBuf,
        outer: &'static str,
        outer_path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayMount {
    lower: PathBuf,
    upper: PathBuf,
    work: PathBuf,
    destination: PathBuf,
}

impl OverlayMount {
    pub fn new(
        lower: impl Into<PathBuf>,
        upper: impl Into<PathBuf>,
        work: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Result<Self, OverlayError> {
        let mount = Self {
            lower: lower.into(),
            upper: upper.into(),
            work: work.into(),
            destination: destination.into(),
        };
        mount.validate()?;
        Ok(mount)
    }

    fn validate(&self) -> Result<(), OverlayError> {
        let roles = [
            ("lower", &self.lower),
            ("upper", &self.upper),
            ("work", &self.work),
            ("destination", &self.destination),
        ];
        for (role, path) in roles {
            if !path.is_absolute() {
                return Err(OverlayError::NotAbsolute {
                    role,
                    path: path.clone(),
                });
            }
            if path.to_string_lossy().contains(RESERVED_CHARS) {
                return Err(OverlayError::ReservedCharacter {
                    role,
                    path: path.clone(),
                });
            }
        }

        // The three host layers must be pairwise disjoint.
        let layers = [
            ("lower", &self.lower),
            ("upper", &self.upper),
            ("work", &self.work),
        ];
        for (i, (a_role, a)) in layers.iter().enumerate() {
            for (b_role, b) in layers.iter().skip(i + 1) {
                if is_within(a, b) {
                    return Err(overlap(b_role, b, a_role, a));
                }
                if is_within(b, a) {
                    return Err(overlap(a_role, a, b_role, b));
                }
            }
        }
        Ok(())
    }

    pub fn lower(&self) -> &Path {
        &self.lower
    }

    pub fn upper(&self) -> &Path {
        &self.upper
    }

    pub fn work(&self) -> &Path {
        &self.work
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The option string understood by the kernel overlay driver.
    pub fn mount_options(&self) -> String {
        format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower.display(),
            self.upper.display(),
            self.work.display()
        )
    }
}

fn overlap(
    inner: &'static str,
    inner_path: &Path,
    outer: &'static str,
    outer_path: &Path,
) -> OverlayError {
    OverlayError::Overlap {
        inner,
        inner_path: inner_path.to_path_buf(),
        outer,
        outer_path: outer_path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_mount_options() {
        let mount = OverlayMount::new(
            "/srv/playground/alice/app",
            "/var/lib/cowork/contributions/abc/upper",
            "/var/lib/cowork/contributions/abc/work",
            "/global/alice/app",
        )
        .unwrap();

        assert_eq!(
            mount.mount_options(),
            "lowerdir=/srv/playground/alice/app,\
             upperdir=/var/lib/cowork/contributions/abc/upper,\
             workdir=/var/lib/cowork/contributions/abc/work"
        );
        assert_eq!(mount.destination(), Path::new("/global/alice/app"));
    }

    #[test]
    fn test_upper_inside_lower_is_rejected() {
        let err = OverlayMount::new(
            "/srv/playground/alice/app",
            "/srv/playground/alice/app/.upper",
            "/var/lib/cowork/work",
            "/global/alice/app",
        )
        .unwrap_err();

        assert!(matches!(
            err,
            OverlayError::Overlap {
                inner: "upper",
                outer: "lower",
                ..
            }
        ));
    }

    #[test]
    fn test_shared_upper_and_work_is_rejected() {
        let err = OverlayMount::new("/lower", "/layers/x", "/layers/x", "/dst").unwrap_err();
        assert!(matches!(err, OverlayError::Overlap { .. }));
    }

    #[test]
    fn test_relative_and_reserved_paths_are_rejected() {
        assert!(matches!(
            OverlayMount::new("lower", "/upper", "/work", "/dst"),
            Err(OverlayError::NotAbsolute { role: "lower", .. })
        ));
        assert!(matches!(
            OverlayMount::new("/lower", "/up,per", "/work", "/dst"),
            Err(OverlayError::ReservedCharacter { role: "upper", .. })
        ));
        assert!(matches!(
            OverlayMount::new("/lower", "/upper", "/work:x", "/dst"),
            Err(OverlayError::ReservedCharacter { role: "work", .. })
        ));
    }
}
