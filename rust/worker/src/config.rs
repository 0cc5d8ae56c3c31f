use nes_config::ConfigError;
use nes_index::PqConfig;
use nes_tracing::LogFilter;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "./nes_config.yaml";
const ENV_PREFIX: &str = "NES_";

#[derive(Deserialize)]
/// # Description
/// The RootConfig for the nes services. This is a YAML file that is shared
/// between all services, and secondarily, fields can be populated from
/// environment variables. The environment variables are prefixed with NES_
/// and are uppercase. Values in the environment variables take precedence
/// over values in the YAML file.
/// By default, it is read from the current working directory,
/// with the filename nes_config.yaml.
pub struct RootConfig {
    pub encoder_service: EncoderServiceConfig,
}

impl RootConfig {
    /// # Description
    /// Load the config from the default location.
    /// # Errors
    /// - If the config file is not valid YAML.
    /// - If the config does not contain the required fields.
    /// - If the file or the environment variables contain invalid values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// # Description
    /// Load the config from a specific location.
    /// # Arguments
    /// - path: The path to the config file. A missing file leaves only the
    ///   environment as a source.
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        nes_config::load_from_path(path, ENV_PREFIX)
    }
}

fn default_dump_path() -> String {
    "./encoder_model.json".to_string()
}

#[derive(Clone, Debug, Deserialize)]
/// # Description
/// The config for the encoder service.
/// ## Description of parameters
/// - service_name: Name used in logs. Must be provided.
/// - dump_path: Where the trained model is read on start and written by `dump`.
/// - encoder: Settings for a fresh encoder, used when no dumped model exists.
/// - log_filters: Per-crate log levels added to the default filter.
/// # Notes
/// In order to set the environment variables, you must prefix them with
/// NES_ENCODER_SERVICE__<FIELD_NAME>. For example, to set the batch size,
/// you would set NES_ENCODER_SERVICE__ENCODER__BATCH_SIZE.
pub struct EncoderServiceConfig {
    pub service_name: String,
    #[serde(default = "default_dump_path")]
    pub dump_path: String,
    #[serde(default)]
    pub encoder: Option<PqConfig>,
    #[serde(default)]
    pub log_filters: Vec<LogFilter>,
}
