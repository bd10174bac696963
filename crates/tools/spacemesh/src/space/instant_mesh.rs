//! InstantMesh space adapter
//!
//! Endpoints, in call order:
//!
//! - `/check_input_image(image)`: fails when the image is missing
//! - `/preprocess(image, do_remove_background)` → `[0]` processed image
//! - `/generate_mvs(image, sample_steps, sample_seed)` → `[0]` multi-view
//!   image, `[1]` preview
//! - `/make3d(images)` → `[0]` OBJ mesh, `[1]` GLB mesh
//!
//! Steps are clamped to [30, 75] (default 75), seeds default to 42.
//! Guidance scale and octree resolution are not used by this space.

use super::{
    Capabilities, Generated, ParameterRanges, ResolvedParameters, SpaceAdapter, SpaceOutput,
    StepRunner,
};
use crate::error::{Error, Result};
use crate::types::{FileData, GenerationRequest, RemoteResult, SpaceKind};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const VALIDATE_ENDPOINT: &str = "/check_input_image";
pub const PREPROCESS_ENDPOINT: &str = "/preprocess";
pub const MULTIVIEW_ENDPOINT: &str = "/generate_mvs";
pub const RECONSTRUCT_ENDPOINT: &str = "/make3d";

pub const PARAMETER_RANGES: ParameterRanges = ParameterRanges {
    min_steps: 30,
    max_steps: 75,
    default_steps: 75,
    default_guidance_scale: 0.0,
    default_seed: 42,
    resolutions: &[],
    default_resolution: 0,
    default_remove_background: true,
};

/// `/make3d` response projected onto named fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstantMeshOutput {
    pub obj: Option<FileData>,
    /// Textured mesh; the preferred slot
    pub glb: Option<FileData>,
}

impl InstantMeshOutput {
    pub fn from_result(result: &RemoteResult) -> Self {
        Self {
            obj: result.file(0),
            glb: result.file(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstantMeshAdapter;

/// Positional arguments of `/generate_mvs`
fn multiview_args(image: &FileData, params: &ResolvedParameters) -> Vec<Value> {
    vec![image.to_argument(), json!(params.steps), json!(params.seed)]
}

#[async_trait]
impl SpaceAdapter for InstantMeshAdapter {
    fn kind(&self) -> SpaceKind {
        SpaceKind::InstantMesh
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            validate: true,
            preprocess: true,
        }
    }

    fn signature_endpoints(&self) -> &'static [&'static str] {
        &[MULTIVIEW_ENDPOINT, RECONSTRUCT_ENDPOINT]
    }

    fn parameter_ranges(&self) -> &ParameterRanges {
        &PARAMETER_RANGES
    }

    async fn validate(&self, steps: &StepRunner<'_>, image: &FileData) -> Result<()> {
        steps
            .call(VALIDATE_ENDPOINT, vec![image.to_argument()])
            .await?;
        Ok(())
    }

    async fn preprocess(
        &self,
        steps: &StepRunner<'_>,
        image: &FileData,
        params: &ResolvedParameters,
    ) -> Result<FileData> {
        let result = steps
            .call(
                PREPROCESS_ENDPOINT,
                vec![image.to_argument(), json!(params.remove_background)],
            )
            .await?;

        result.file(0).ok_or_else(|| Error::GenerationFailed {
            operation_id: steps.ctx.operation_id.clone(),
            reason: format!("{} returned no processed image", PREPROCESS_ENDPOINT),
        })
    }

    async fn generate(
        &self,
        steps: &StepRunner<'_>,
        image: &FileData,
        _request: &GenerationRequest,
        params: &ResolvedParameters,
    ) -> Result<Generated> {
        tracing::info!(
            "Generating multi-view images: steps={} seed={}",
            params.steps,
            params.seed
        );
        let mvs = steps
            .call_critical(MULTIVIEW_ENDPOINT, multiview_args(image, params))
            .await?;
        let multiview = mvs.file(0).ok_or_else(|| Error::GenerationFailed {
            operation_id: steps.ctx.operation_id.clone(),
            reason: format!("{} returned no multi-view image", MULTIVIEW_ENDPOINT),
        })?;

        tracing::info!("Reconstructing mesh from multi-view image");
        let meshes = steps
            .call_critical(RECONSTRUCT_ENDPOINT, vec![multiview.to_argument()])
            .await?;
        let output = InstantMeshOutput::from_result(&meshes);

        Ok(Generated {
            responses: vec![
                (MULTIVIEW_ENDPOINT.to_string(), mvs),
                (RECONSTRUCT_ENDPOINT.to_string(), meshes),
            ],
            output: SpaceOutput::InstantMesh(output),
        })
    }
}
