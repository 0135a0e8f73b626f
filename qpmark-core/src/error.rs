use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid frame dimensions: {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },

    #[error("embedding engine not bound to a frame geometry")]
    NotInitialized,

    #[error("insufficient frames: need at least {needed}, got {got}")]
    InsufficientFrames { needed: usize, got: usize },

    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("ambiguous payload encoding: {0:?}")]
    DecodeAmbiguous(String),

    #[error("model profile error: {0}")]
    Model(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
