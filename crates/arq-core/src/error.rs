use arq_abstract::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start drain thread: {0}")]
    Spawn(#[from] std::io::Error),
}
