use std::sync::Arc;

use async_trait::async_trait;
use nes_config::Configurable;
use nes_error::{NesError, NesValidationError};
use validator::Validate;

use crate::codebook::{Codebook, EncoderModel};
use crate::config::{KMeansConfig, PqConfig};
use crate::device::{DeviceProbe, DevicePolicy};
use crate::error::{BackendError, PqError};
use crate::execution::{
    encode_direct, Accelerator, Backend, EncodeKernel, EncodeOptions, ExecutionContext,
};
use crate::params::PqParams;
use crate::trainer::train_codebook;

/// Codes of a batch of vectors: `num_bytes` bytes per vector, row-major, in
/// input order. Every byte is in `1..=num_clusters`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Codes {
    num_bytes: usize,
    bytes: Vec<u8>,
}

impl Codes {
    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    /// Number of encoded vectors.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.num_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn row(&self, idx: usize) -> Option<&[u8]> {
        let start = idx.checked_mul(self.num_bytes)?;
        let end = start.checked_add(self.num_bytes)?;
        self.bytes.get(start..end)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes.chunks_exact(self.num_bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for Codes {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug)]
enum EncoderState {
    Untrained,
    Trained(EncodeKernel),
}

/// Product-quantization encoder.
///
/// An encoder starts untrained and becomes trained by [`PqEncoder::train`] or
/// by loading a codebook. Encoding before that fails with
/// [`PqError::NotTrained`]. Training takes `&mut self`, so it can never
/// overlap an `encode` on the same instance; `encode` itself only reads the
/// codebook and may be called from several threads, with accelerator batches
/// serialized by the execution context.
#[derive(Debug)]
pub struct PqEncoder {
    params: PqParams,
    kmeans_config: KMeansConfig,
    encode_options: EncodeOptions,
    device_policy: DevicePolicy,
    accelerator: Arc<dyn Accelerator>,
    state: EncoderState,
}

impl PqEncoder {
    /// Builds an untrained encoder whose accelerator path runs on the device
    /// chosen by `device_policy`.
    pub fn new(params: PqParams, device_policy: DevicePolicy) -> Result<Self, PqError> {
        let context = ExecutionContext::acquire(device_policy.binding(), None)?;
        Ok(Self::with_accelerator(params, device_policy, Arc::new(context)))
    }

    pub fn with_accelerator(
        params: PqParams,
        device_policy: DevicePolicy,
        accelerator: Arc<dyn Accelerator>,
    ) -> Self {
        Self {
            params,
            kmeans_config: KMeansConfig::default(),
            encode_options: EncodeOptions::default(),
            device_policy,
            accelerator,
            state: EncoderState::Untrained,
        }
    }

    /// Validates `config`, runs the device policy against `probe` and builds
    /// an untrained encoder.
    pub fn from_config(
        config: &PqConfig,
        probe: &dyn DeviceProbe,
    ) -> Result<Self, Box<dyn NesError>> {
        config
            .validate()
            .map_err(|e| NesValidationError::from(e).boxed())?;
        let params = PqParams::new(config.k, config.m, config.num_clusters).map_err(|e| e.boxed())?;
        let device_policy = DevicePolicy::select(probe, &config.device);
        let context = ExecutionContext::acquire(device_policy.binding(), config.accelerator_threads)
            .map_err(|e| PqError::from(e).boxed())?;
        Ok(
            Self::with_accelerator(params, device_policy, Arc::new(context))
                .with_kmeans_config(config.kmeans.clone())
                .with_encode_options(EncodeOptions::from(config)),
        )
    }

    /// Restores a trained encoder from its persisted model.
    pub fn from_model(model: EncoderModel, device_policy: DevicePolicy) -> Result<Self, PqError> {
        let mut encoder = Self::new(model.params, device_policy)?;
        encoder.load_codebook(Arc::new(model.codebook))?;
        Ok(encoder)
    }

    pub fn with_kmeans_config(mut self, kmeans_config: KMeansConfig) -> Self {
        self.kmeans_config = kmeans_config;
        self
    }

    pub fn with_encode_options(mut self, encode_options: EncodeOptions) -> Self {
        self.encode_options = encode_options;
        self
    }

    pub fn params(&self) -> &PqParams {
        &self.params
    }

    pub fn device_policy(&self) -> &DevicePolicy {
        &self.device_policy
    }

    pub fn encode_options(&self) -> &EncodeOptions {
        &self.encode_options
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, EncoderState::Trained(_))
    }

    pub fn codebook(&self) -> Option<&Arc<Codebook>> {
        match &self.state {
            EncoderState::Untrained => None,
            EncoderState::Trained(kernel) => Some(kernel.codebook()),
        }
    }

    /// The persisted form of this encoder.
    pub fn model(&self) -> Result<EncoderModel, PqError> {
        let codebook = self.codebook().ok_or(PqError::NotTrained)?;
        Ok(EncoderModel {
            params: self.params,
            codebook: codebook.as_ref().clone(),
        })
    }

    /// Installs an existing codebook, e.g. one shared with another encoder.
    pub fn load_codebook(&mut self, codebook: Arc<Codebook>) -> Result<(), PqError> {
        if !codebook.matches(&self.params) {
            return Err(PqError::InvalidParameters(format!(
                "codebook of shape [{}, {}, {}] does not fit k={}, m={}, num_clusters={}",
                codebook.num_bytes(),
                codebook.num_clusters(),
                codebook.subvector_width(),
                self.params.k(),
                self.params.m(),
                self.params.num_clusters()
            )));
        }
        self.state = EncoderState::Trained(EncodeKernel::new(codebook));
        Ok(())
    }

    /// Trains a new codebook from `vectors`, replacing any previous one. On
    /// failure the previous codebook is kept.
    #[tracing::instrument(skip_all, fields(num_vectors = vectors.len()))]
    pub fn train<T: AsRef<[f32]>>(&mut self, vectors: &[T]) -> Result<(), PqError> {
        let codebook = train_codebook(&self.params, &self.kmeans_config, vectors)?;
        if self.is_trained() {
            tracing::info!("Replacing previously trained codebook");
        }
        self.state = EncoderState::Trained(EncodeKernel::new(Arc::new(codebook)));
        tracing::info!(
            "Trained codebook with {} subspaces of {} clusters",
            self.params.num_bytes(),
            self.params.num_clusters()
        );
        Ok(())
    }

    /// Encodes with the configured batch size and backend.
    pub fn encode<T: AsRef<[f32]>>(&self, vectors: &[T]) -> Result<Codes, PqError> {
        self.encode_with(vectors, &self.encode_options)
    }

    #[tracing::instrument(skip(self, vectors), fields(num_vectors = vectors.len()))]
    pub fn encode_with<T: AsRef<[f32]>>(
        &self,
        vectors: &[T],
        options: &EncodeOptions,
    ) -> Result<Codes, PqError> {
        let kernel = self.kernel()?;
        if options.batch_size == 0 {
            return Err(PqError::InvalidParameters(
                "batch_size must be positive".to_string(),
            ));
        }
        self.params.check_widths(vectors)?;
        let rows = vectors.iter().map(AsRef::as_ref).collect::<Vec<_>>();
        let bytes = match options.backend {
            Backend::Accelerator => self.run_batches(kernel, &rows, options.batch_size)?,
            Backend::Direct => encode_direct(kernel, &rows),
        };
        Ok(Codes {
            num_bytes: self.params.num_bytes(),
            bytes,
        })
    }

    /// Encodes on the accelerator path in batches of `batch_size` vectors.
    pub fn encode_accelerated<T: AsRef<[f32]>>(
        &self,
        vectors: &[T],
        batch_size: usize,
    ) -> Result<Codes, PqError> {
        self.encode_with(
            vectors,
            &EncodeOptions {
                batch_size,
                backend: Backend::Accelerator,
            },
        )
    }

    /// Encodes on the direct path in a single pass.
    pub fn encode_direct<T: AsRef<[f32]>>(&self, vectors: &[T]) -> Result<Codes, PqError> {
        self.encode_with(
            vectors,
            &EncodeOptions {
                batch_size: self.encode_options.batch_size,
                backend: Backend::Direct,
            },
        )
    }

    fn kernel(&self) -> Result<&EncodeKernel, PqError> {
        match &self.state {
            EncoderState::Untrained => Err(PqError::NotTrained),
            EncoderState::Trained(kernel) => Ok(kernel),
        }
    }

    fn run_batches(
        &self,
        kernel: &EncodeKernel,
        rows: &[&[f32]],
        batch_size: usize,
    ) -> Result<Vec<u8>, PqError> {
        let num_bytes = kernel.num_bytes();
        let mut bytes = Vec::with_capacity(rows.len() * num_bytes);
        for (batch_idx, batch) in rows.chunks(batch_size).enumerate() {
            let codes = self.accelerator.encode_batch(kernel, batch_idx, batch)?;
            if codes.len() != batch.len() * num_bytes {
                return Err(BackendError::BatchFailed {
                    batch: batch_idx,
                    binding: self.accelerator.binding(),
                    reason: format!(
                        "expected {} codes, got {}",
                        batch.len() * num_bytes,
                        codes.len()
                    ),
                }
                .into());
            }
            bytes.extend_from_slice(&codes);
            tracing::debug!(
                "Encoded batch {} ({} vectors) on {}",
                batch_idx,
                batch.len(),
                self.accelerator.binding()
            );
        }
        Ok(bytes)
    }
}

#[async_trait]
impl Configurable<(PqConfig, Arc<dyn DeviceProbe>)> for PqEncoder {
    async fn try_from_config(
        config: &(PqConfig, Arc<dyn DeviceProbe>),
    ) -> Result<Self, Box<dyn NesError>> {
        let (config, probe) = config;
        Self::from_config(config, probe.as_ref())
    }
}
