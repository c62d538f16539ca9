use proglog_rs::server::grpc::{LogService, proto};
use proglog_rs::storage::log::{Log, LogConfig};
use proto::log_server::LogServer;
use std::path::PathBuf;
use tonic::transport::Server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("starting proglog-rs gRPC server");

    let log_dir = PathBuf::from("data");
    let config = LogConfig {
        max_store_bytes: 1024 * 1024,
        max_index_bytes: 1024 * 1024,
        initial_offset: 0,
    };

    let log = Log::new(log_dir, config)?;
    info!("log initialized in ./data directory");

    let log_service = LogService::new(log);

    let addr = "[::1]:50051".parse()?;
    info!(%addr, "server listening");

    Server::builder()
        .add_service(LogServer::new(log_service))
        .serve(addr)
        .await?;
    Ok(())
}
