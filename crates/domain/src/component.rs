//! Lifecycle contract shared by the long-running pieces the supervisor drives.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComponentError {
    #[error("{name} is already running")]
    AlreadyRunning { name: &'static str },
    #[error("{name} task failed: {cause}")]
    Task { name: &'static str, cause: String },
}

#[async_trait]
pub trait Component: Send {
    fn name(&self) -> &'static str;

    async fn start(&mut self) -> Result<(), ComponentError>;

    async fn stop(&mut self) -> Result<(), ComponentError>;
}
