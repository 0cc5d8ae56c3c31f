pub mod codebook;
pub mod config;
pub mod device;
pub mod encoder;
pub mod error;
pub mod execution;
pub mod kmeans;
pub mod params;
pub mod trainer;

// Re-export types

pub use codebook::{Codebook, EncoderModel};
pub use config::{DevicePolicyConfig, KMeansConfig, PqConfig};
pub use device::{
    DeviceBinding, DeviceInfo, DevicePolicy, DeviceProbe, DeviceProbeError, NoAcceleratorProbe,
    StaticDeviceProbe,
};
pub use encoder::{Codes, PqEncoder};
pub use error::{BackendError, DimensionError, PqError};
pub use execution::{Accelerator, Backend, EncodeKernel, EncodeOptions, ExecutionContext};
pub use params::{PqParams, MAX_NUM_CLUSTERS};
pub use trainer::train_codebook;
