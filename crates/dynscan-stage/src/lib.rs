//! dynscan-stage: Helper artifact staging
//!
//! Keeps a versioned helper executable present and current in a staging
//! directory on the execution host, copying and pruning only when the local
//! copy is newer.

pub mod error;
pub mod local;
pub mod lock;
pub mod remote;
pub mod stager;
pub mod traits;
pub mod types;
pub mod version;

pub use error::{StageError, StageWarning};
pub use local::LocalFs;
pub use lock::StagingLocks;
pub use remote::RemoteFs;
pub use stager::ArtifactStager;
pub use traits::StagingFs;
pub use types::{
    ArtifactPattern, ArtifactSource, PathStyle, StageAction, StagedArtifact, StagingDirectory,
};
pub use version::ArtifactVersion;
