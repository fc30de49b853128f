//! LINE2D template matching.
//!
//! Templates are sparse sets of quantized gradient orientations. A scene image is
//! turned into linearized response maps once, after which every template is scored at
//! every position by adding up precomputed per orientation responses. Pyramids of both
//! run the search coarse to fine.
//!
//! ```no_run
//! use line2d::{LinearizedMapPyramid, MapsConfig, TemplateConfig, TemplatePyramid};
//!
//! let template = line2d::image::Image::open("template.png")?;
//! let scene = line2d::image::Image::open("scene.png")?;
//! let pyramid = TemplatePyramid::from_image(template.view(), "part", &TemplateConfig::default())?
//!     .expect("template has too few features");
//! let maps = LinearizedMapPyramid::from_image(scene.view(), &MapsConfig::default())?;
//! for m in maps.match_template(&pyramid, 85.0)? {
//!     println!("{} at ({}, {}) with {}%", m.template.class_label(), m.x, m.y, m.score);
//! }
//! # Ok::<(), line2d::Error>(())
//! ```

pub mod clustering;
pub mod config;
mod detector;
mod error;
pub mod feature;
pub mod feature_map;
pub mod gradient;
pub mod image;
pub mod linear_maps;
pub mod matches;
#[cfg(feature = "serde")]
pub mod serialization;
pub mod template;

pub use clustering::{MatchClustering, MatchGroup};
pub use config::{MapsConfig, TemplateConfig, DEFAULT_MIN_MATCHING_PERCENTAGE};
pub use detector::{refinement_search_area, similarity_map};
pub use error::{Error, Result};
pub use feature::Feature;
pub use linear_maps::{LinearizedMapPyramid, LinearizedMaps};
pub use matches::Match;
pub use template::{Template, TemplateKind, TemplatePyramid};

/// Number of quantized gradient orientation bins.
pub const NUM_ORIENTATIONS: usize = 8;

/// Similarity of a feature whose orientation is present in the scene.
pub const MAX_FEATURE_SIMILARITY: u8 = 4;

/// Features that can be summed in a byte accumulator before it has to be flushed.
pub const MAX_FEATURES_PER_BYTE_FLUSH: usize = u8::MAX as usize / MAX_FEATURE_SIMILARITY as usize;

/// Upper bound of features per template so that a full score fits in an `i16`.
pub const MAX_NUM_FEATURES: usize = i16::MAX as usize / MAX_FEATURE_SIMILARITY as usize;
