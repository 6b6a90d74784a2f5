use thiserror::Error;

/// Failure to bring up a disposable backend.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("failed to start test container: {0}")]
    Container(#[from] testcontainers::TestcontainersError),
}

pub type Result<T> = std::result::Result<T, TestInfraError>;
