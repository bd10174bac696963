//! Per-space adapters
//!
//! Each supported space exposes its own endpoints, argument order, parameter
//! ranges and result positions. An adapter owns that knowledge and projects
//! the positional response into a typed [`SpaceOutput`], so the workflow
//! never indexes into a raw result.

pub mod hunyuan;
pub mod instant_mesh;

use crate::client::PredictClient;
use crate::error::{Error, Result};
use crate::retry::{retry, RetryPolicy};
use crate::types::{
    FileData, GenerationParameters, GenerationRequest, OperationContext, RemoteResult, SpaceKind,
    MAX_GUIDANCE_SCALE, MAX_SEED,
};
use async_trait::async_trait;
use serde_json::Value;

pub use hunyuan::{HunyuanAdapter, HunyuanOutput};
pub use instant_mesh::{InstantMeshAdapter, InstantMeshOutput};

/// Optional steps a space supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Space exposes an input validation endpoint
    pub validate: bool,
    /// Space exposes a background removal / preprocessing endpoint
    pub preprocess: bool,
}

/// Valid ranges and defaults of one space's generation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRanges {
    pub min_steps: u32,
    pub max_steps: u32,
    pub default_steps: u32,
    pub default_guidance_scale: f32,
    pub default_seed: i64,
    /// Accepted octree resolutions; empty when the space has none
    pub resolutions: &'static [u32],
    pub default_resolution: u32,
    pub default_remove_background: bool,
}

/// Parameters after clamping, ready to be sent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParameters {
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: i64,
    pub octree_resolution: Option<u32>,
    pub remove_background: bool,
}

impl ParameterRanges {
    /// Clamp or default every field; never fails
    pub fn resolve(&self, params: &GenerationParameters) -> ResolvedParameters {
        let steps = params
            .steps
            .map(|s| s.clamp(self.min_steps, self.max_steps))
            .unwrap_or(self.default_steps);
        let guidance_scale = params
            .guidance_scale
            .filter(|g| g.is_finite())
            .map(|g| g.clamp(0.0, MAX_GUIDANCE_SCALE))
            .unwrap_or(self.default_guidance_scale);
        let seed = params
            .seed
            .map(|s| s.clamp(0, MAX_SEED))
            .unwrap_or(self.default_seed);
        let octree_resolution = if self.resolutions.is_empty() {
            None
        } else {
            Some(
                params
                    .octree_resolution
                    .filter(|r| self.resolutions.contains(r))
                    .unwrap_or(self.default_resolution),
            )
        };

        ResolvedParameters {
            steps,
            guidance_scale,
            seed,
            octree_resolution,
            remove_background: params
                .remove_background
                .unwrap_or(self.default_remove_background),
        }
    }
}

/// Typed projection of a space's generation response
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceOutput {
    Hunyuan3d(HunyuanOutput),
    InstantMesh(InstantMeshOutput),
}

/// The two meshes chosen to fill the canonical slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSelection {
    pub obj: FileData,
    pub glb: FileData,
    /// True when a lesser slot had to stand in for the preferred one
    pub fallback: bool,
}

impl SpaceOutput {
    /// Choose the canonical mesh pair, falling back to the base slot
    pub fn select_meshes(&self, operation_id: &str) -> Result<MeshSelection> {
        let selection = match self {
            SpaceOutput::Hunyuan3d(out) => {
                select_with_fallback(out.textured_mesh.as_ref(), out.white_mesh.as_ref())
                    .map(|(mesh, fallback)| MeshSelection {
                        obj: mesh.clone(),
                        glb: mesh.clone(),
                        fallback,
                    })
            }
            SpaceOutput::InstantMesh(out) => {
                let obj = out.obj.as_ref().filter(|f| f.is_usable());
                let glb = out.glb.as_ref().filter(|f| f.is_usable());
                match (obj, glb) {
                    (Some(obj), Some(glb)) => Some(MeshSelection {
                        obj: obj.clone(),
                        glb: glb.clone(),
                        fallback: false,
                    }),
                    _ => select_with_fallback(glb, obj).map(|(mesh, _)| MeshSelection {
                        obj: mesh.clone(),
                        glb: mesh.clone(),
                        fallback: true,
                    }),
                }
            }
        };

        match selection {
            Some(selection) => {
                if selection.fallback {
                    tracing::warn!(
                        "Preferred mesh slot missing, using fallback mesh {} for both outputs",
                        selection.glb.url.as_deref().unwrap_or_default()
                    );
                }
                Ok(selection)
            }
            None => Err(Error::NoValidMeshFound {
                operation_id: operation_id.to_string(),
            }),
        }
    }
}

/// Pick `preferred` when usable, otherwise `fallback`; flags the fallback
fn select_with_fallback<'a>(
    preferred: Option<&'a FileData>,
    fallback: Option<&'a FileData>,
) -> Option<(&'a FileData, bool)> {
    match preferred.filter(|f| f.is_usable()) {
        Some(file) => Some((file, false)),
        None => fallback.filter(|f| f.is_usable()).map(|file| (file, true)),
    }
}

/// Output of an adapter's generation step
#[derive(Debug, Clone)]
pub struct Generated {
    /// Raw responses per endpoint, in call order, for debug snapshots
    pub responses: Vec<(String, RemoteResult)>,
    pub output: SpaceOutput,
}

/// Executes remote calls of one run with the configured retry policies
pub struct StepRunner<'a> {
    pub client: &'a dyn PredictClient,
    pub ctx: &'a OperationContext,
    pub policy: &'a RetryPolicy,
    pub critical_policy: &'a RetryPolicy,
}

impl StepRunner<'_> {
    /// Call `endpoint` under the ordinary retry policy
    pub async fn call(&self, endpoint: &str, args: Vec<Value>) -> Result<RemoteResult> {
        self.call_with(self.policy, endpoint, args).await
    }

    /// Call a generation endpoint under the critical retry policy
    ///
    /// An empty response is fatal and not retried.
    pub async fn call_critical(&self, endpoint: &str, args: Vec<Value>) -> Result<RemoteResult> {
        let result = self.call_with(self.critical_policy, endpoint, args).await?;
        if result.is_empty() {
            return Err(Error::GenerationFailed {
                operation_id: self.ctx.operation_id.clone(),
                reason: format!("{} returned no result slots", endpoint),
            });
        }
        Ok(result)
    }

    /// Upload the input image under the ordinary retry policy
    pub async fn upload(&self, data: Vec<u8>, file_name: &str) -> Result<FileData> {
        tracing::info!("Uploading {} ({} bytes)", file_name, data.len());
        retry(self.policy, &self.ctx.operation_id, "upload", || {
            self.client.upload(data.clone(), file_name)
        })
        .await
    }

    async fn call_with(
        &self,
        policy: &RetryPolicy,
        endpoint: &str,
        args: Vec<Value>,
    ) -> Result<RemoteResult> {
        tracing::info!("Calling {} on {}", endpoint, self.client.space());
        retry(policy, &self.ctx.operation_id, endpoint, || {
            self.client.predict(endpoint, args.clone())
        })
        .await
    }
}

/// Encodes one space's capabilities, calls and response shape
#[async_trait]
pub trait SpaceAdapter: Send + Sync {
    fn kind(&self) -> SpaceKind;

    fn capabilities(&self) -> Capabilities;

    /// Endpoints whose presence identifies this space
    fn signature_endpoints(&self) -> &'static [&'static str];

    fn parameter_ranges(&self) -> &ParameterRanges;

    /// Reject unusable input; only called when `capabilities().validate`
    async fn validate(&self, _steps: &StepRunner<'_>, _image: &FileData) -> Result<()> {
        Ok(())
    }

    /// Remove the background; only called when `capabilities().preprocess`
    async fn preprocess(
        &self,
        _steps: &StepRunner<'_>,
        image: &FileData,
        _params: &ResolvedParameters,
    ) -> Result<FileData> {
        Ok(image.clone())
    }

    async fn generate(
        &self,
        steps: &StepRunner<'_>,
        image: &FileData,
        request: &GenerationRequest,
        params: &ResolvedParameters,
    ) -> Result<Generated>;
}

/// Adapter for a known space kind
pub fn adapter_for(kind: SpaceKind) -> Box<dyn SpaceAdapter> {
    match kind {
        SpaceKind::Hunyuan3d => Box::new(HunyuanAdapter),
        SpaceKind::InstantMesh => Box::new(InstantMeshAdapter),
    }
}

/// Identify the space from its endpoint listing
pub fn detect(endpoints: &[String]) -> Option<SpaceKind> {
    let has = |name: &str| {
        let name = name.trim_start_matches('/');
        endpoints.iter().any(|e| e.trim_start_matches('/') == name)
    };
    [SpaceKind::InstantMesh, SpaceKind::Hunyuan3d]
        .into_iter()
        .find(|kind| adapter_for(*kind).signature_endpoints().iter().all(|&e| has(e)))
}
