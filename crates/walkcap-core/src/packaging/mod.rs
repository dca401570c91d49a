//! Turning a finished session directory into an immutable, self-describing bundle

mod archive;
mod bundle;
mod manifest;
mod packager;

pub use archive::{ARCHIVE_FILE, write_archive};
pub use bundle::ArtifactBundle;
pub use manifest::{EndReason, Manifest, ManifestOptions, StreamEntry};
pub use packager::{ArtifactPackager, CollectedSession, StreamReport};

pub(crate) use bundle::{LEASE_FILE, SESSION_FILE};
pub(crate) use packager::count_mesh_files;
