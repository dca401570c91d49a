//! Durable, resumable upload of sealed bundles
//!
//! [`UploadQueue`] owns every [`UploadJob`]. Jobs are journaled after each state change so a
//! restart resumes them, and each job writes its objects under a remote prefix fixed at enqueue
//! time so retries land on the same keys.

mod job;
mod journal;
mod path;
mod progress;
mod queue;
pub mod store;

pub use job::{JobState, UploadJob, UploadMetadata};
pub use journal::QueueJournal;
pub use path::{object_key, remote_prefix, resolve_scene_id};
pub use progress::ProgressTracker;
pub use queue::UploadQueue;
pub use store::{
    HttpStore, LocalDirStore, ObjectMetadata, ProgressFn, RemoteStore, SharedRemoteStore,
    UploadBody, store_from_config,
};
