use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider fetch failed at offset {offset} (limit {limit}): {reason}")]
    Fetch {
        offset: usize,
        limit: usize,
        reason: String,
    },
    #[error("provider can not count children: {reason}")]
    Count {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("page size must be greater than zero")]
    ZeroPageSize,
    #[error("max preload {max_preload} is smaller than page size {page_size}")]
    PreloadBelowPage {
        max_preload: usize,
        page_size: usize,
    },
}

#[derive(Debug, Clone, Error)]
pub enum WindowError {
    #[error("requested preload of {requested} rows exceeds the allowed maximum of {max}")]
    PreloadLimitExceeded {
        requested: usize,
        max: usize,
    },
    #[error("invalid window configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("data provider error: {0}")]
    Provider(#[from] ProviderError),
}
