use anyhow::Result;
use chunky_ingest::config::IngestOptions;
use chunky_ingest::server::IngestServer;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr, stdout is the MCP stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting chunky-ingest MCP server v{}", env!("CARGO_PKG_VERSION"));

    let options = IngestOptions::from_env()?;
    tracing::info!(
        "Default timezone: {}, zone policy: {:?}, floating policy: {:?}",
        options.default_timezone.as_deref().unwrap_or("none"),
        options.timezone_policy,
        options.floating_policy
    );

    let server = IngestServer::new(options)?;
    let router = server.into_router();
    let service = router.serve(rmcp::transport::io::stdio()).await?;

    tracing::info!("chunky-ingest is ready");
    service.waiting().await?;

    Ok(())
}
