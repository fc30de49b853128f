use crate::image::{Rect, Size};
use thiserror::Error;

/// Everything that can go wrong while building templates or matching them.
///
/// Failing to build a template pyramid because some level has too few features
/// is not an error. Those constructors return `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("search area {area:?} is not contained in the {image:?} image")]
    SearchAreaOutOfBounds { area: Rect, image: Size },
    #[error("region {rect:?} is not contained in the {image:?} image")]
    RegionOutOfBounds { rect: Rect, image: Size },
    #[error("scene pyramid has {maps} levels but the template pyramid has {templates}")]
    PyramidLevelMismatch { maps: usize, templates: usize },
    #[error("masked templates can only be built from single channel gray images")]
    MaskRequiresGrayImage,
    #[error("gradients need a 1 or 3 channel image, got {0} channels")]
    UnsupportedChannelCount(usize),
    #[error("minimum number of same orientations must be in 0..=9, got {0}")]
    InvalidMinSameOrientations(u8),
    #[error("spreading neighborhood must be at least 1")]
    InvalidNeighborhood(usize),
    #[error("angle label {0} is not an orientation bin")]
    InvalidAngleLabel(u8),
    #[error("template pyramid class is empty")]
    EmptyClass,
    #[error("invalid array shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serde")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
