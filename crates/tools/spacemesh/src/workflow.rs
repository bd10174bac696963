//! Generation workflow: space detection, step sequencing and persistence

use crate::artifact::{
    decode_base64_image, write_debug_snapshot, ArtifactWriter, FileArtifactWriter, Payload,
    SavedFile,
};
use crate::client::{GradioClient, PredictClient};
use crate::config::SpaceConfig;
use crate::error::{ArtifactError, Error, Result};
use crate::notify::ResourceNotifier;
use crate::retry::RetryPolicy;
use crate::space::{self, SpaceAdapter, StepRunner};
use crate::types::{
    FileData, GenerationRequest, ImageInput, MeshArtifact, MeshArtifactPair, MeshFormat,
    OperationContext, RemoteResult, SpaceKind,
};
use std::sync::Arc;

/// Label of the persisted input image after preprocessing
pub const PROCESSED_IMAGE_LABEL: &str = "processed_image";

/// Drives an image-to-3D run against whichever space the client points at
///
/// # Example
///
/// ```no_run
/// use spacemesh::{
///     BroadcastNotifier, GenerationParameters, GenerationRequest, ImageInput, SpaceConfig,
///     Workflow,
/// };
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = SpaceConfig::load()?;
///     let workflow = Workflow::from_config(&config, Arc::new(BroadcastNotifier::default()));
///
///     let request = GenerationRequest::new(ImageInput::Path("chair.png".into()))
///         .with_parameters(GenerationParameters::default().with_steps(30).with_seed(7));
///     let ctx = config.operation_context("generate_3d_model");
///
///     let meshes = workflow.generate(&ctx, &request).await?;
///     println!("OBJ: {}", meshes.obj.path.display());
///     println!("GLB: {}", meshes.glb.path.display());
///     Ok(())
/// }
/// ```
pub struct Workflow {
    client: Arc<dyn PredictClient>,
    writer: Arc<dyn ArtifactWriter>,
    notifier: Arc<dyn ResourceNotifier>,
    retry: RetryPolicy,
    generation_retry: RetryPolicy,
    space_hint: Option<SpaceKind>,
}

impl Workflow {
    pub fn new(
        client: Arc<dyn PredictClient>,
        writer: Arc<dyn ArtifactWriter>,
        notifier: Arc<dyn ResourceNotifier>,
    ) -> Self {
        Self {
            client,
            writer,
            notifier,
            retry: RetryPolicy::default(),
            generation_retry: RetryPolicy::critical(),
            space_hint: None,
        }
    }

    /// Wire a Gradio client and a filesystem writer from configuration
    pub fn from_config(config: &SpaceConfig, notifier: Arc<dyn ResourceNotifier>) -> Self {
        let client = GradioClient::new(config.space.clone())
            .with_token(config.token.clone())
            .with_predict_timeout(config.request_timeout);
        let writer =
            FileArtifactWriter::new().with_token(config.token.clone(), client.base_url());

        Self::new(Arc::new(client), Arc::new(writer), notifier)
            .with_retry_policy(config.retry)
            .with_generation_retry_policy(config.generation_retry)
            .with_space_hint(config.space_type)
    }

    /// Policy for validation, preprocessing and uploads
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Policy for the generation endpoints
    pub fn with_generation_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.generation_retry = policy;
        self
    }

    /// Space kind to assume when the endpoint probe is inconclusive
    pub fn with_space_hint(mut self, kind: Option<SpaceKind>) -> Self {
        self.space_hint = kind;
        self
    }

    /// Identify the space by probing its endpoint listing
    pub async fn detect_space(&self, ctx: &OperationContext) -> Result<SpaceKind> {
        match self.client.endpoints().await {
            Ok(endpoints) => {
                if let Some(kind) = space::detect(&endpoints) {
                    tracing::info!("Detected {} space at {}", kind, self.client.space());
                    return Ok(kind);
                }
                tracing::warn!(
                    "No adapter matches endpoints of {}: {:?}",
                    self.client.space(),
                    endpoints
                );
            }
            Err(e) => {
                tracing::warn!("Failed to probe endpoints of {}: {}", self.client.space(), e);
            }
        }

        match self.space_hint {
            Some(kind) => {
                tracing::info!("Using configured space type {}", kind);
                Ok(kind)
            }
            None => Err(Error::UnsupportedSpace {
                operation_id: ctx.operation_id.clone(),
                space: self.client.space().to_string(),
            }),
        }
    }

    /// Run a full generation and return the persisted mesh pair
    pub async fn generate(
        &self,
        ctx: &OperationContext,
        request: &GenerationRequest,
    ) -> Result<MeshArtifactPair> {
        let kind = self.detect_space(ctx).await?;
        let adapter = space::adapter_for(kind);
        self.run(adapter.as_ref(), ctx, request).await
    }

    /// Run a generation with a given adapter, skipping detection
    pub async fn run(
        &self,
        adapter: &dyn SpaceAdapter,
        ctx: &OperationContext,
        request: &GenerationRequest,
    ) -> Result<MeshArtifactPair> {
        let kind = adapter.kind();
        let capabilities = adapter.capabilities();
        let params = adapter
            .parameter_ranges()
            .resolve(&request.parameters.normalized());
        let steps = StepRunner {
            client: self.client.as_ref(),
            ctx,
            policy: &self.retry,
            critical_policy: &self.generation_retry,
        };
        tracing::info!(
            "[{}] Starting {} generation on {}",
            ctx.operation_id,
            kind,
            self.client.space()
        );

        let input = self.upload_input(&steps, ctx, &request.image).await?;

        if capabilities.validate {
            adapter.validate(&steps, &input).await?;
            tracing::info!("Input image validated");
        } else {
            tracing::info!("{} has no validation endpoint, skipping validation", kind);
        }

        let processed = if capabilities.preprocess {
            let processed = adapter.preprocess(&steps, &input, &params).await?;
            let extension = processed
                .extension()
                .unwrap_or_else(|| request.image.extension());
            self.persist(
                ctx,
                &Payload::Remote(processed.clone()),
                PROCESSED_IMAGE_LABEL,
                &extension,
            )
            .await?;
            processed
        } else {
            tracing::info!(
                "{} has no preprocessing endpoint, using the input image as processed",
                kind
            );
            let payload = Payload::from_image(&request.image).map_err(|source| {
                Error::InvalidImage {
                    operation_id: ctx.operation_id.clone(),
                    source,
                }
            })?;
            self.persist(
                ctx,
                &payload,
                PROCESSED_IMAGE_LABEL,
                &request.image.extension(),
            )
            .await?;
            input
        };

        let generated = adapter.generate(&steps, &processed, request, &params).await?;
        for (endpoint, raw) in &generated.responses {
            self.snapshot(ctx, endpoint, raw).await;
        }

        let selection = generated.output.select_meshes(&ctx.operation_id)?;
        let obj = self.persist_mesh(ctx, MeshFormat::Obj, &selection.obj).await?;
        let glb = self.persist_mesh(ctx, MeshFormat::Glb, &selection.glb).await?;

        tracing::info!(
            "[{}] Generation complete: {} and {}",
            ctx.operation_id,
            obj.path.display(),
            glb.path.display()
        );
        Ok(MeshArtifactPair { obj, glb })
    }

    /// Make the input image available to the space
    async fn upload_input(
        &self,
        steps: &StepRunner<'_>,
        ctx: &OperationContext,
        image: &ImageInput,
    ) -> Result<FileData> {
        let invalid = |source: ArtifactError| Error::InvalidImage {
            operation_id: ctx.operation_id.clone(),
            source,
        };
        let data = match image {
            ImageInput::Url(url) => return Ok(FileData::from_url(url.clone())),
            ImageInput::Bytes { data, .. } => data.clone(),
            ImageInput::Base64(text) => decode_base64_image(text).map_err(invalid)?,
            ImageInput::Path(path) => tokio::fs::read(path).await.map_err(|source| {
                invalid(ArtifactError::Io {
                    path: path.clone(),
                    source,
                })
            })?,
        };
        steps.upload(data, &image.file_name()).await
    }

    /// Save one artifact and announce it
    async fn persist(
        &self,
        ctx: &OperationContext,
        payload: &Payload,
        label: &str,
        extension: &str,
    ) -> Result<SavedFile> {
        let saved = self
            .writer
            .save(payload, label, extension, ctx)
            .await
            .map_err(|source| Error::ArtifactWrite {
                operation_id: ctx.operation_id.clone(),
                label: label.to_string(),
                source,
            })?;
        tracing::info!("Saved {} to {}", label, saved.path.display());
        self.notifier.resource_list_changed();
        Ok(saved)
    }

    async fn persist_mesh(
        &self,
        ctx: &OperationContext,
        format: MeshFormat,
        file: &FileData,
    ) -> Result<MeshArtifact> {
        let label = format!("mesh_{}", format);
        let extension = file
            .extension()
            .unwrap_or_else(|| format.extension().to_string());
        let saved = self
            .persist(ctx, &Payload::Remote(file.clone()), &label, &extension)
            .await?;

        Ok(MeshArtifact {
            label,
            format,
            extension,
            path: saved.path,
        })
    }

    /// Best-effort: failures are logged and dropped
    async fn snapshot(&self, ctx: &OperationContext, endpoint: &str, raw: &RemoteResult) {
        match write_debug_snapshot(ctx, endpoint, raw).await {
            Ok(path) => tracing::debug!("Wrote {} response to {}", endpoint, path.display()),
            Err(e) => tracing::warn!("{}", e),
        }
    }
}
