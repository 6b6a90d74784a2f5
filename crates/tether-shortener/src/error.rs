use tether_core::ShortenerError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry was used before the startup scan seeded it.
    #[error("url registry is not initialized")]
    Uninitialized,
}

impl From<RegistryError> for ShortenerError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::Uninitialized => Self::Uninitialized,
        }
    }
}
