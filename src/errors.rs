use thiserror::Error;

use crate::{config::ConfigError, fan_curve::CurveLoadError};

// The main daemon error type
#[derive(Debug, Error)]
pub enum LiquifanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    CurveLoad(#[from] CurveLoadError),
}
