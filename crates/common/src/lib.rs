//! Filesystem building blocks shared by the cowork daemon.
//!
//! - [`sandbox`]: path resolution confined to a root directory
//! - [`overlay`]: structured overlay mount descriptions
//! - [`layers`]: applying or dropping an overlay upper layer

pub mod layers;
pub mod overlay;
pub mod sandbox;

pub mod prelude {
    pub use crate::layers::{apply_upper_layer, remove_layer_tree, LayerError, MergeStats};
    pub use crate::overlay::{OverlayError, OverlayMount};
    pub use crate::sandbox::{confine_existing, resolve, resolve_strict, SandboxError};
}
