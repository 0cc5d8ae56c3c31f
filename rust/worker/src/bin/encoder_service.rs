use nes_worker::encoder_service_entrypoint;

#[tokio::main]
async fn main() {
    encoder_service_entrypoint().await;
}
