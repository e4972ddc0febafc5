use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("cache initialization failed: {0}")]
    CacheInit(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
