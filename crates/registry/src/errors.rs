use thiserror::Error;

use crate::backend::RegistryList;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read registry list {list}: {reason}")]
    Read { list: RegistryList, reason: String },
    #[error("failed to write registry list {list}: {reason}")]
    Write { list: RegistryList, reason: String },
    #[error("invalid registry configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
