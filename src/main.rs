use signed_webhooks::config::Config;
use signed_webhooks::domain::ports::handler_fn;
use signed_webhooks::server::Server;
use signed_webhooks::telemetry;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    telemetry::init_tracing();

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Loaded configuration: {:?}", config);

    // Create and run server
    let server = Server::new(&config).await?;

    server
        .dispatcher()
        .register_wildcard(handler_fn("EventLogger", |event| async move {
            tracing::info!(
                event = %event.event(),
                message_id = %event.message_id,
                data = %event.payload.data,
                "Processing webhook"
            );
            Ok(())
        }))
        .await;

    server.run().await
}
