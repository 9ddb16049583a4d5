use thiserror::Error;

use crate::application::core::CoreError;
use crate::cache::StoreError;
use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Top-level failure reported by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Core(#[from] CoreError),
}
