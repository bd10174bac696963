//! Hunyuan3D-2 space adapter
//!
//! The space has no validation or preprocessing endpoint: background removal
//! is a flag of the single generation call.
//!
//! `/generation_all` arguments, in order:
//!
//! | # | argument          | value                          |
//! |---|-------------------|--------------------------------|
//! | 0 | caption           | prompt, or null when empty     |
//! | 1 | image             | uploaded input image           |
//! | 2 | mv_image_front    | null                           |
//! | 3 | mv_image_back     | null                           |
//! | 4 | mv_image_left     | null                           |
//! | 5 | mv_image_right    | null                           |
//! | 6 | steps             | [20, 50], default 20           |
//! | 7 | guidance_scale    | [0, 100], default 5.0          |
//! | 8 | seed              | [0, 10000000], default 1234    |
//! | 9 | octree_resolution | 256, 384 or 512, default 256   |
//! | 10| check_box_rembg   | remove background, default on  |
//! | 11| num_chunks        | 8000                           |
//! | 12| randomize_seed    | false                          |
//!
//! Result positions: `[0]` untextured mesh, `[1]` textured mesh,
//! `[2]` HTML preview, `[3]` stats, `[4]` seed used.

use super::{
    Capabilities, Generated, ParameterRanges, ResolvedParameters, SpaceAdapter, SpaceOutput,
    StepRunner,
};
use crate::error::Result;
use crate::types::{FileData, GenerationRequest, RemoteResult, SpaceKind};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const GENERATION_ENDPOINT: &str = "/generation_all";

/// Number of chunks the space decodes the volume in
const NUM_CHUNKS: u32 = 8000;

pub const PARAMETER_RANGES: ParameterRanges = ParameterRanges {
    min_steps: 20,
    max_steps: 50,
    default_steps: 20,
    default_guidance_scale: 5.0,
    default_seed: 1234,
    resolutions: &[256, 384, 512],
    default_resolution: 256,
    default_remove_background: true,
};

/// `/generation_all` response projected onto named fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HunyuanOutput {
    pub white_mesh: Option<FileData>,
    pub textured_mesh: Option<FileData>,
    pub preview_html: Option<String>,
    pub stats: Option<Value>,
    pub seed: Option<i64>,
}

impl HunyuanOutput {
    pub fn from_result(result: &RemoteResult) -> Self {
        Self {
            white_mesh: result.file(0),
            textured_mesh: result.file(1),
            preview_html: result.slot(2).and_then(Value::as_str).map(str::to_string),
            stats: result.slot(3).filter(|v| !v.is_null()).cloned(),
            seed: result.slot(4).and_then(Value::as_i64),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HunyuanAdapter;

impl HunyuanAdapter {
    /// Positional arguments of `/generation_all`
    pub fn generation_args(
        image: &FileData,
        prompt: &str,
        params: &ResolvedParameters,
    ) -> Vec<Value> {
        let caption = if prompt.trim().is_empty() {
            Value::Null
        } else {
            json!(prompt)
        };
        let resolution = params
            .octree_resolution
            .unwrap_or(PARAMETER_RANGES.default_resolution);

        vec![
            caption,
            image.to_argument(),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            json!(params.steps),
            json!(params.guidance_scale),
            json!(params.seed),
            json!(resolution),
            json!(params.remove_background),
            json!(NUM_CHUNKS),
            json!(false),
        ]
    }
}

#[async_trait]
impl SpaceAdapter for HunyuanAdapter {
    fn kind(&self) -> SpaceKind {
        SpaceKind::Hunyuan3d
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            validate: false,
            preprocess: false,
        }
    }

    fn signature_endpoints(&self) -> &'static [&'static str] {
        &[GENERATION_ENDPOINT]
    }

    fn parameter_ranges(&self) -> &ParameterRanges {
        &PARAMETER_RANGES
    }

    async fn generate(
        &self,
        steps: &StepRunner<'_>,
        image: &FileData,
        request: &GenerationRequest,
        params: &ResolvedParameters,
    ) -> Result<Generated> {
        tracing::info!(
            "Generating: steps={} guidance={} seed={} octree={:?} rembg={}",
            params.steps,
            params.guidance_scale,
            params.seed,
            params.octree_resolution,
            params.remove_background
        );
        let args = Self::generation_args(image, &request.prompt, params);
        let result = steps.call_critical(GENERATION_ENDPOINT, args).await?;
        let output = HunyuanOutput::from_result(&result);

        Ok(Generated {
            responses: vec![(GENERATION_ENDPOINT.to_string(), result)],
            output: SpaceOutput::Hunyuan3d(output),
        })
    }
}
