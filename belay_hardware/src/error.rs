use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("multiplier {0} rejected by filament driver")]
    InvalidMultiplier(f64),
    #[error("rotation distance {0} rejected by stepper")]
    InvalidRotationDistance(f64),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
