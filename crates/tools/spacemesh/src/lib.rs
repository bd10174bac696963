//! Image-to-3D generation against hosted Gradio spaces
//!
//! This crate drives the hosted Hunyuan3D-2 and InstantMesh spaces from an
//! input image to a pair of mesh files on disk, hiding the differences between
//! the two spaces behind a single workflow.
//!
//! # Features
//!
//! - **Space Detection**: Identify the backend from its endpoint listing
//! - **Backend Adapters**: Per-space argument order, parameter ranges and result slots
//! - **Retry Logic**: Exponential backoff, with a higher ceiling for generation calls
//! - **Mesh Fallback**: Reuse the base mesh when the preferred slot is missing
//! - **Artifact Storage**: Atomic writes, debug snapshots and change notifications
//!
//! # Example
//!
//! ```no_run
//! use spacemesh::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SpaceConfig::load()?;
//!     let notifier = Arc::new(BroadcastNotifier::default());
//!     let mut changes = notifier.subscribe();
//!     let workflow = Workflow::from_config(&config, notifier);
//!
//!     let request = GenerationRequest::new(ImageInput::Url(
//!         "https://example.com/chair.png".to_string(),
//!     ))
//!     .with_prompt("a wooden chair");
//!     let ctx = config.operation_context("generate_3d_model");
//!
//!     let meshes = workflow.generate(&ctx, &request).await?;
//!     while changes.try_recv().is_ok() {}
//!
//!     println!("{} / {}", meshes.obj.path.display(), meshes.glb.path.display());
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod retry;
pub mod space;
pub mod types;
pub mod workflow;

pub use artifact::{ArtifactWriter, FileArtifactWriter, Payload, SavedFile};
pub use client::{GradioClient, PredictClient};
pub use config::SpaceConfig;
pub use error::{ArtifactError, Error, PredictError, Result};
pub use notify::{BroadcastNotifier, NoopNotifier, ResourceNotifier};
pub use retry::RetryPolicy;
pub use space::{SpaceAdapter, SpaceOutput};
pub use types::{
    FileData, GenerationParameters, GenerationRequest, ImageInput, MeshArtifact,
    MeshArtifactPair, MeshFormat, OperationContext, RemoteResult, SpaceKind,
};
pub use workflow::Workflow;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::GradioClient;
    pub use crate::config::SpaceConfig;
    pub use crate::error::Error;
    pub use crate::notify::{BroadcastNotifier, ResourceNotifier};
    pub use crate::types::{
        GenerationParameters, GenerationRequest, ImageInput, MeshArtifactPair, OperationContext,
        SpaceKind,
    };
    pub use crate::workflow::Workflow;
}
