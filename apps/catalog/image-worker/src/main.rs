//! Image Worker Service - Entry Point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    catalog_image_worker::run().await
}
