use thiserror::Error;

/// Failures raised by feature registration.
///
/// All of these are non-retryable for the same inputs; callers may retry with
/// the binary detector or relaxed thresholds.
#[derive(Debug, Clone, Error)]
pub enum AlignError {
    #[error(
        "insufficient features: {keypoints} keypoints in {image} image (need at least {min})"
    )]
    InsufficientFeatures {
        image: &'static str,
        keypoints: usize,
        min: usize,
    },
    #[error("insufficient matches: {matches} survived the ratio test (need at least {min})")]
    InsufficientMatches { matches: usize, min: usize },
    #[error("homography estimation failed: no valid projective transform found")]
    HomographyFailure,
    #[error("image dimensions {width}x{height} too small for feature detection")]
    ImageTooSmall { width: u32, height: u32 },
}

pub type AlignResult<T> = Result<T, AlignError>;
