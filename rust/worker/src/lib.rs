pub mod config;
pub mod encoder_service;

use std::sync::Arc;

use nes_config::Configurable;
use nes_index::{DeviceProbe, NoAcceleratorProbe};

pub use encoder_service::{EncoderComponent, EncoderServiceError};

pub async fn encoder_service_entrypoint() {
    let config = match config::RootConfig::load() {
        Ok(config) => config.encoder_service,
        Err(err) => {
            println!("Failed to load config: {}", err);
            return;
        }
    };
    nes_tracing::init_stdout_tracing(&config.log_filters);

    let probe: Arc<dyn DeviceProbe> = Arc::new(NoAcceleratorProbe);
    let component = match EncoderComponent::try_from_config(&(config.clone(), probe)).await {
        Ok(component) => component,
        Err(err) => {
            tracing::error!("Failed to create encoder component: {}", err);
            return;
        }
    };
    tracing::info!(
        "{} ready on {} (trained: {})",
        config.service_name,
        component.encoder().device_policy().binding(),
        component.is_trained()
    );

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
    if component.is_trained() {
        if let Err(err) = component.dump().await {
            tracing::error!("Failed to dump encoder on shutdown: {}", err);
        }
    }
    tracing::info!("{} stopped", config.service_name);
}
