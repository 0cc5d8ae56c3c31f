use serde::{Deserialize, Serialize};
use validator::Validate;

pub fn default_num_clusters() -> usize {
    50
}

pub fn default_batch_size() -> usize {
    10_000
}

pub fn default_use_accelerator() -> bool {
    true
}

pub fn default_num_iters() -> usize {
    20
}

pub fn default_num_init_trials() -> usize {
    3
}

pub fn default_max_points_per_centroid() -> usize {
    256
}

pub fn default_max_memory() -> f32 {
    0.1
}

pub fn default_max_load() -> f32 {
    0.1
}

/// Settings for the per-subspace k-means runs.
/// - num_iters: Refinement iterations per subspace. Runs stop early only once
///   the centroids no longer move.
/// - num_init_trials: Random seedings tried before refinement; the seeding with
///   the lowest total distance is kept.
/// - max_points_per_centroid: Training rows are subsampled down to
///   `num_clusters * max_points_per_centroid` when there are more.
/// - seed: Makes training deterministic when set.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, PartialEq)]
pub struct KMeansConfig {
    #[serde(default = "default_num_iters")]
    #[validate(range(min = 1))]
    pub num_iters: usize,
    #[serde(default = "default_num_init_trials")]
    #[validate(range(min = 1))]
    pub num_init_trials: usize,
    #[serde(default = "default_max_points_per_centroid")]
    #[validate(range(min = 1))]
    pub max_points_per_centroid: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            num_iters: default_num_iters(),
            num_init_trials: default_num_init_trials(),
            max_points_per_centroid: default_max_points_per_centroid(),
            seed: None,
        }
    }
}

/// Thresholds a device must stay below to be picked for the accelerator path.
/// Utilization values are fractions in `[0, 1]`.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, PartialEq)]
pub struct DevicePolicyConfig {
    #[serde(default = "default_max_memory")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_memory: f32,
    #[serde(default = "default_max_load")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_load: f32,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DevicePolicyConfig {
    fn default() -> Self {
        Self {
            max_memory: default_max_memory(),
            max_load: default_max_load(),
            seed: None,
        }
    }
}

/// # Description
/// Configuration of a product-quantization encoder.
/// ## Description of parameters
/// - k: Width of the input vectors. Must be provided.
/// - m: Width of each subspace. Must divide `k`. Must be provided.
/// - num_clusters: Centroids per subspace. Codes are `1..=num_clusters`, so this must fit a byte.
/// - batch_size: Vectors per accelerator batch.
/// - use_accelerator: Whether `encode` prefers the batched accelerator path over the direct path.
/// - accelerator_threads: Worker threads of the accelerator execution context.
///   Defaults to one per core.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, PartialEq)]
pub struct PqConfig {
    #[validate(range(min = 1))]
    pub k: usize,
    #[validate(range(min = 1))]
    pub m: usize,
    #[serde(default = "default_num_clusters")]
    #[validate(range(min = 1, max = 255))]
    pub num_clusters: usize,
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
    #[serde(default = "default_use_accelerator")]
    pub use_accelerator: bool,
    #[serde(default)]
    pub accelerator_threads: Option<usize>,
    #[serde(default)]
    #[validate(nested)]
    pub kmeans: KMeansConfig,
    #[serde(default)]
    #[validate(nested)]
    pub device: DevicePolicyConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: PqConfig = serde_json::from_str(r#"{"k": 8, "m": 2}"#).expect("valid config");
        assert_eq!(config.num_clusters, 50);
        assert_eq!(config.batch_size, 10_000);
        assert!(config.use_accelerator);
        assert_eq!(config.accelerator_threads, None);
        assert_eq!(config.kmeans, KMeansConfig::default());
        assert_eq!(config.device.max_memory, 0.1);
        assert_eq!(config.device.max_load, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_num_clusters_must_fit_a_byte() {
        let config: PqConfig = serde_json::from_str(r#"{"k": 8, "m": 2, "num_clusters": 256}"#)
            .expect("valid json");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nested_configs_are_validated() {
        let config: PqConfig = serde_json::from_str(
            r#"{"k": 8, "m": 2, "kmeans": {"num_iters": 0}, "device": {"max_load": 1.5}}"#,
        )
        .expect("valid json");
        let errors = config.validate().expect_err("nested fields are out of range");
        let fields = errors.errors();
        assert!(fields.contains_key("kmeans"));
        assert!(fields.contains_key("device"));
    }
}
