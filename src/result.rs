use super::errors::{
    ConfigError,
    ProviderError,
    WindowError,
};

pub type ProviderResult<T> = Result<T,ProviderError>;
pub type ConfigResult<T> = Result<T,ConfigError>;
pub type WindowResult<T> = Result<T,WindowError>;
