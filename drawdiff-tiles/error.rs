use thiserror::Error;

/// Failures raised while building or writing tile pyramids.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("cannot tile an empty {width}x{height} raster")]
    EmptyImage { width: u32, height: u32 },
    #[error("tile size must be at least 1")]
    ZeroTileSize,
    #[error("overlay composition failed: {0}")]
    Overlay(#[from] drawdiff_mask::MaskError),
    #[error("tile encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("tile tree I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type TileResult<T> = Result<T, TileError>;
