use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nes_config::Configurable;
use nes_error::{ErrorCodes, NesError};
use nes_index::{
    Codes, DevicePolicy, DevicePolicyConfig, DeviceProbe, EncoderModel, PqConfig, PqEncoder,
    PqError,
};
use thiserror::Error;

use crate::config::EncoderServiceConfig;

#[derive(Debug, Error)]
pub enum EncoderServiceError {
    #[error("No dumped model at {dump_path} and no encoder config to build one from")]
    ComponentNotLoaded { dump_path: String },
    #[error("Failed to build encoder: {0}")]
    Config(Box<dyn NesError>),
    #[error(transparent)]
    Encoder(#[from] PqError),
    #[error("Malformed model at {path}: {source}")]
    Model {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl NesError for EncoderServiceError {
    fn code(&self) -> ErrorCodes {
        match self {
            EncoderServiceError::ComponentNotLoaded { .. } => ErrorCodes::NotFound,
            EncoderServiceError::Config(e) => e.code(),
            EncoderServiceError::Encoder(e) => e.code(),
            EncoderServiceError::Model { .. } => ErrorCodes::DataLoss,
            EncoderServiceError::Io { source, .. } => source.code(),
        }
    }
}

/// Holds the service's encoder and its dump location.
///
/// On start the component prefers a dumped, trained model. Without one it
/// falls back to a fresh encoder built from the `encoder` config section,
/// which must be trained before it can encode.
#[derive(Debug)]
pub struct EncoderComponent {
    encoder: PqEncoder,
    dump_path: PathBuf,
}

impl EncoderComponent {
    pub fn encoder(&self) -> &PqEncoder {
        &self.encoder
    }

    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    pub fn is_trained(&self) -> bool {
        self.encoder.is_trained()
    }

    pub fn handle_train(&mut self, vectors: &[Vec<f32>]) -> Result<(), EncoderServiceError> {
        self.encoder.train(vectors)?;
        Ok(())
    }

    pub fn handle_encode(&self, vectors: &[Vec<f32>]) -> Result<Codes, EncoderServiceError> {
        Ok(self.encoder.encode(vectors)?)
    }

    /// Writes the trained model to the dump path as JSON.
    pub async fn dump(&self) -> Result<(), EncoderServiceError> {
        let model = self.encoder.model()?;
        let path = self.dump_path.display().to_string();
        let bytes = serde_json::to_vec(&model).map_err(|source| EncoderServiceError::Model {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&self.dump_path, bytes)
            .await
            .map_err(|source| EncoderServiceError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::info!("Dumped trained encoder to {}", path);
        Ok(())
    }

    async fn read_model(path: &Path) -> Result<Option<EncoderModel>, EncoderServiceError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(EncoderServiceError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| EncoderServiceError::Model {
                path: path.display().to_string(),
                source,
            })
    }

    fn restore(
        model: EncoderModel,
        encoder_config: Option<&PqConfig>,
        probe: &dyn DeviceProbe,
    ) -> Result<PqEncoder, EncoderServiceError> {
        match encoder_config {
            Some(config)
                if (config.k, config.m, config.num_clusters)
                    == (model.params.k(), model.params.m(), model.params.num_clusters()) =>
            {
                let mut encoder =
                    PqEncoder::from_config(config, probe).map_err(EncoderServiceError::Config)?;
                encoder.load_codebook(Arc::new(model.codebook))?;
                Ok(encoder)
            }
            Some(config) => {
                tracing::warn!(
                    "Dumped model has k={}, m={}, num_clusters={} which differs from the encoder config; using the dumped model",
                    model.params.k(),
                    model.params.m(),
                    model.params.num_clusters()
                );
                let policy = DevicePolicy::select(probe, &config.device);
                Ok(PqEncoder::from_model(model, policy)?)
            }
            None => {
                let policy = DevicePolicy::select(probe, &DevicePolicyConfig::default());
                Ok(PqEncoder::from_model(model, policy)?)
            }
        }
    }
}

#[async_trait]
impl Configurable<(EncoderServiceConfig, Arc<dyn DeviceProbe>)> for EncoderComponent {
    async fn try_from_config(
        config: &(EncoderServiceConfig, Arc<dyn DeviceProbe>),
    ) -> Result<Self, Box<dyn NesError>> {
        let (config, probe) = config;
        let dump_path = PathBuf::from(&config.dump_path);
        let encoder = match Self::read_model(&dump_path).await.map_err(|e| e.boxed())? {
            Some(model) => {
                let encoder = Self::restore(model, config.encoder.as_ref(), probe.as_ref())
                    .map_err(|e| e.boxed())?;
                tracing::info!("Loaded a trained encoder from {}", config.dump_path);
                encoder
            }
            None => {
                tracing::warn!("Failed to load the model from {}", config.dump_path);
                let Some(encoder_config) = &config.encoder else {
                    return Err(EncoderServiceError::ComponentNotLoaded {
                        dump_path: config.dump_path.clone(),
                    }
                    .boxed());
                };
                let encoder = PqEncoder::from_config(encoder_config, probe.as_ref())?;
                tracing::info!("Loaded an untrained encoder, training is needed");
                encoder
            }
        };
        Ok(Self { encoder, dump_path })
    }
}
