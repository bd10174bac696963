//! Request, response and artifact types shared by the workflow and adapters

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound for guidance scale accepted by any space
pub const MAX_GUIDANCE_SCALE: f32 = 100.0;

/// Upper bound for seeds accepted by any space
pub const MAX_SEED: i64 = 10_000_000;

/// Input image for a generation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Raw encoded image bytes (PNG, JPEG, ...)
    Bytes { data: Vec<u8>, file_name: String },
    /// Base64-encoded image, with or without a `data:` URL prefix
    Base64(String),
    /// Image file on the local filesystem
    Path(PathBuf),
    /// Image already reachable over HTTP
    Url(String),
}

impl ImageInput {
    /// File name to use when uploading or persisting the image
    pub fn file_name(&self) -> String {
        match self {
            ImageInput::Bytes { file_name, .. } => file_name.clone(),
            ImageInput::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "input.png".to_string()),
            ImageInput::Url(url) => url
                .split(['?', '#'])
                .next()
                .unwrap_or(url.as_str())
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty() && name.contains('.'))
                .map(str::to_string)
                .unwrap_or_else(|| "input.png".to_string()),
            ImageInput::Base64(_) => "input.png".to_string(),
        }
    }

    /// Extension of the image file, lowercased, defaulting to `png`
    pub fn extension(&self) -> String {
        Path::new(&self.file_name())
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "png".to_string())
    }
}

/// Generation parameters as supplied by the caller
///
/// Every field is optional. Missing or out-of-range values are never an
/// error: [`GenerationParameters::normalized`] clamps the space-independent
/// fields and each adapter clamps the rest to its own ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Octree / volume resolution (Hunyuan3D only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub octree_resolution: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_background: Option<bool>,
}

impl GenerationParameters {
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.guidance_scale = Some(guidance_scale);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_octree_resolution(mut self, resolution: u32) -> Self {
        self.octree_resolution = Some(resolution);
        self
    }

    pub fn with_remove_background(mut self, remove: bool) -> Self {
        self.remove_background = Some(remove);
        self
    }

    /// Clamp the space-independent fields (guidance scale and seed)
    ///
    /// A non-finite guidance scale is dropped so the adapter default applies.
    pub fn normalized(&self) -> Self {
        Self {
            guidance_scale: self
                .guidance_scale
                .filter(|g| g.is_finite())
                .map(|g| g.clamp(0.0, MAX_GUIDANCE_SCALE)),
            seed: self.seed.map(|s| s.clamp(0, MAX_SEED)),
            ..self.clone()
        }
    }
}

/// A single image-to-3D generation request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: ImageInput,
    pub prompt: String,
    pub parameters: GenerationParameters,
}

impl GenerationRequest {
    pub fn new(image: ImageInput) -> Self {
        Self {
            image,
            prompt: String::new(),
            parameters: GenerationParameters::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// File payload as exchanged with a Gradio space
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileData {
    /// Reference to a file already stored on the space
    pub fn from_server_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Reference to a file reachable over HTTP
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Parse a result slot, accepting both file objects and plain URL strings
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            Value::String(s) if s.starts_with("http://") || s.starts_with("https://") => {
                Some(Self::from_url(s.clone()))
            }
            _ => None,
        }
    }

    /// A slot is usable only when it points at a downloadable url
    pub fn is_usable(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }

    /// File extension taken from the original name, url or path
    pub fn extension(&self) -> Option<String> {
        [&self.orig_name, &self.url, &self.path]
            .into_iter()
            .flatten()
            .find_map(|name| {
                let name = name.split(['?', '#']).next().unwrap_or(name.as_str());
                Path::new(name)
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
            })
    }

    /// JSON value to pass as a Gradio call argument
    ///
    /// Gradio requires `path`; a url-only reference sends its url as the path.
    pub fn to_argument(&self) -> Value {
        let file = match (&self.path, &self.url) {
            (None, Some(url)) => Self {
                path: Some(url.clone()),
                ..self.clone()
            },
            _ => self.clone(),
        };
        let mut value = serde_json::to_value(&file).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert(
                "meta".to_string(),
                serde_json::json!({ "_type": "gradio.FileData" }),
            );
        }
        value
    }
}

/// Raw response of a prediction call: positional, backend-specific slots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteResult(pub Vec<Value>);

impl RemoteResult {
    pub fn new(slots: Vec<Value>) -> Self {
        Self(slots)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Slot `index` parsed as a file payload
    pub fn file(&self, index: usize) -> Option<FileData> {
        self.slot(index).and_then(FileData::from_value)
    }
}

/// Canonical output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    Obj,
    Glb,
}

impl MeshFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MeshFormat::Obj => "obj",
            MeshFormat::Glb => "glb",
        }
    }
}

impl std::fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// One persisted mesh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshArtifact {
    /// Identifying label, also the base of the file name
    pub label: String,
    /// Canonical slot this artifact fills
    pub format: MeshFormat,
    /// Extension actually written; differs from `format` when a single
    /// remote mesh fills both slots
    pub extension: String,
    pub path: PathBuf,
}

/// The canonical result of a run: one artifact per output format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshArtifactPair {
    pub obj: MeshArtifact,
    pub glb: MeshArtifact,
}

/// Correlation data threaded through every step of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub operation_id: String,
    pub tool_name: String,
    pub work_dir: PathBuf,
    pub assets_dir: PathBuf,
}

impl OperationContext {
    /// Create a context with a freshly generated operation id
    pub fn new(
        tool_name: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        assets_dir: impl Into<PathBuf>,
    ) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let tool_name = tool_name.into();
        let operation_id = format!(
            "{}-{}-{}",
            tool_name,
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            operation_id,
            tool_name,
            work_dir: work_dir.into(),
            assets_dir: assets_dir.into(),
        }
    }

    /// Replace the generated id with one supplied by the caller
    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = operation_id.into();
        self
    }
}

/// Supported space backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceKind {
    Hunyuan3d,
    InstantMesh,
}

impl SpaceKind {
    pub fn name(self) -> &'static str {
        match self {
            SpaceKind::Hunyuan3d => "hunyuan3d",
            SpaceKind::InstantMesh => "instantmesh",
        }
    }
}

impl std::fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SpaceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "hunyuan3d" | "hunyuan" | "hunyuan3d2" => Ok(SpaceKind::Hunyuan3d),
            "instantmesh" => Ok(SpaceKind::InstantMesh),
            other => Err(format!("unknown space type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_clamps_guidance_and_seed() {
        let params = GenerationParameters::default()
            .with_guidance_scale(250.0)
            .with_seed(-3)
            .with_steps(5);
        let normalized = params.normalized();

        assert_eq!(normalized.guidance_scale, Some(100.0));
        assert_eq!(normalized.seed, Some(0));
        // steps are left to the adapter
        assert_eq!(normalized.steps, Some(5));

        let params = GenerationParameters::default()
            .with_guidance_scale(f32::NAN)
            .with_seed(99_000_000);
        let normalized = params.normalized();
        assert_eq!(normalized.guidance_scale, None);
        assert_eq!(normalized.seed, Some(MAX_SEED));
    }

    #[test]
    fn test_file_data_usability() {
        assert!(FileData::from_url("https://example.com/a.glb").is_usable());
        assert!(!FileData::from_url("   ").is_usable());
        assert!(!FileData::from_server_path("/tmp/gradio/a.glb").is_usable());
    }

    #[test]
    fn test_file_data_from_value() {
        let slot = json!({
            "path": "/tmp/gradio/abc/white_mesh.glb",
            "url": "https://space.hf.space/gradio_api/file=/tmp/gradio/abc/white_mesh.glb",
            "orig_name": "white_mesh.glb",
            "size": 1024,
            "mime_type": null,
            "meta": { "_type": "gradio.FileData" }
        });
        let file = FileData::from_value(&slot).expect("file object");
        assert!(file.is_usable());
        assert_eq!(file.extension().as_deref(), Some("glb"));
        assert_eq!(file.size, Some(1024));

        let url = json!("https://example.com/mesh.obj?download=1");
        let file = FileData::from_value(&url).expect("url string");
        assert_eq!(file.extension().as_deref(), Some("obj"));

        assert!(FileData::from_value(&json!("<div>preview</div>")).is_none());
        assert!(FileData::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_file_argument_carries_meta() {
        let arg = FileData::from_server_path("/tmp/gradio/in.png").to_argument();
        assert_eq!(arg["path"], "/tmp/gradio/in.png");
        assert_eq!(arg["meta"]["_type"], "gradio.FileData");

        let arg = FileData::from_url("https://example.com/chair.png").to_argument();
        assert_eq!(arg["path"], "https://example.com/chair.png");
        assert_eq!(arg["url"], "https://example.com/chair.png");
        assert_eq!(arg["meta"]["_type"], "gradio.FileData");
    }

    #[test]
    fn test_image_input_names() {
        let input = ImageInput::Path(PathBuf::from("/data/chair.JPG"));
        assert_eq!(input.file_name(), "chair.JPG");
        assert_eq!(input.extension(), "jpg");

        let input = ImageInput::Url("https://example.com/images/".to_string());
        assert_eq!(input.file_name(), "input.png");

        let input = ImageInput::Url("https://cdn.example/chair.png?sig=abc#top".to_string());
        assert_eq!(input.file_name(), "chair.png");
        assert_eq!(input.extension(), "png");
        assert_eq!(ImageInput::Base64("aGk=".into()).extension(), "png");
    }

    #[test]
    fn test_space_kind_parsing() {
        assert_eq!("Hunyuan3D-2".parse::<SpaceKind>(), Ok(SpaceKind::Hunyuan3d));
        assert_eq!("instant_mesh".parse::<SpaceKind>(), Ok(SpaceKind::InstantMesh));
        assert!("trellis".parse::<SpaceKind>().is_err());
    }

    #[test]
    fn test_operation_ids_are_unique() {
        let a = OperationContext::new("generate_3d", ".", "assets");
        let b = OperationContext::new("generate_3d", ".", "assets");
        assert_ne!(a.operation_id, b.operation_id);
        assert!(a.operation_id.starts_with("generate_3d-"));

        let c = a.clone().with_operation_id("fixed");
        assert_eq!(c.operation_id, "fixed");
    }
}
