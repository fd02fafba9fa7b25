use thiserror::Error;

/// Failures raised by difference classification and overlay composition.
#[derive(Debug, Clone, Error)]
pub enum MaskError {
    #[error(
        "shape mismatch: reference {reference_width}x{reference_height} vs target {target_width}x{target_height}"
    )]
    ShapeMismatch {
        reference_width: u32,
        reference_height: u32,
        target_width: u32,
        target_height: u32,
    },
    #[error("intensity threshold {0} outside supported range 1-100")]
    InvalidIntensityThreshold(u8),
    #[error("structural threshold {0} must lie strictly between 0 and 1")]
    InvalidStructuralThreshold(f64),
    #[error("no overlays to combine")]
    NoOverlays,
    #[error(
        "overlay dimensions {got_width}x{got_height} do not match {expected_width}x{expected_height}"
    )]
    OverlayShapeMismatch {
        expected_width: u32,
        expected_height: u32,
        got_width: u32,
        got_height: u32,
    },
}

pub type MaskResult<T> = Result<T, MaskError>;
