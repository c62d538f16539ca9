//! gRPC front end for the log: translates `Produce`/`Consume` requests into
//! calls against a shared `Log` and maps log errors onto gRPC status codes.
use crate::{
    errors::{LogError, NetworkError},
    storage::log::Log,
};
use proto::{ConsumeRequest, ConsumeResponse, ProduceRequest, ProduceResponse};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub mod proto {
    tonic::include_proto!("log.v1");
}

trait IntoStatus {
    fn into_status(self) -> Status;
}

impl IntoStatus for LogError {
    fn into_status(self) -> Status {
        match &self {
            LogError::OffsetOutOfRange { offset, .. } => {
                Status::not_found(format!("offset {offset} not found"))
            }
            LogError::Segment(e) => Status::internal(format!("segment error: {e}")),
            other => Status::internal(format!("log error: {other}")),
        }
    }
}

impl IntoStatus for NetworkError {
    fn into_status(self) -> Status {
        match &self {
            NetworkError::TaskFailed(msg) => Status::internal(format!("task failed: {msg}")),
        }
    }
}

/// The log already serializes its own internal state behind a mutex, so
/// the service only needs to share ownership across requests.
pub struct LogService {
    log: Arc<Log>,
}

impl LogService {
    pub fn new(log: Log) -> Self {
        Self { log: Arc::new(log) }
    }
}

#[tonic::async_trait]
impl proto::log_server::Log for LogService {
    async fn produce(
        &self,
        request: Request<ProduceRequest>,
    ) -> Result<Response<ProduceResponse>, Status> {
        let record = request.into_inner().record;
        let log = Arc::clone(&self.log);

        let offset = tokio::task::spawn_blocking(move || log.append(&record))
            .await
            .map_err(|e| NetworkError::TaskFailed(e.to_string()).into_status())?
            .map_err(|e| e.into_status())?;

        Ok(Response::new(ProduceResponse { offset }))
    }

    async fn consume(
        &self,
        request: Request<ConsumeRequest>,
    ) -> Result<Response<ConsumeResponse>, Status> {
        let offset = request.into_inner().offset;
        let log = Arc::clone(&self.log);

        let record = tokio::task::spawn_blocking(move || log.read(offset))
            .await
            .map_err(|e| NetworkError::TaskFailed(e.to_string()).into_status())?
            .map_err(|e| e.into_status())?;

        Ok(Response::new(ConsumeResponse { record, offset }))
    }
}
