/// Parameters of template pyramid construction.
///
/// The number of pyramid levels is the length of `max_features_per_level`, which must
/// match the number of levels of the [`MapsConfig`] used for the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateConfig {
    /// Minimum (non squared) gradient magnitude of a template feature.
    pub min_feature_strength: i32,

    /// A pyramid with fewer features than this at any level is not built.
    pub min_number_of_features: usize,

    /// Maximum number of features per pyramid level, finest level first.
    pub max_features_per_level: Vec<usize>,

    /// Votes out of a 3x3 neighborhood needed for an orientation to count as stable.
    pub min_same_orientations: u8,
}

impl TemplateConfig {
    /// This convenience constructor is provided for the common case where only
    /// the per level feature limits change.
    pub fn new(max_features_per_level: Vec<usize>) -> Self {
        Self {
            max_features_per_level,
            ..Default::default()
        }
    }

    pub fn levels(&self) -> usize {
        self.max_features_per_level.len()
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            min_feature_strength: 40,
            min_number_of_features: 30,
            max_features_per_level: vec![100],
            min_same_orientations: 4,
        }
    }
}

/// Parameters of scene linearized map construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MapsConfig {
    /// Minimum (non squared) gradient magnitude of a valid orientation.
    pub min_gradient_magnitude: i32,

    /// Spreading neighborhood per pyramid level, finest level first.
    pub neighborhood_per_level: Vec<usize>,

    /// Votes out of a 3x3 neighborhood needed for an orientation to count as stable.
    pub min_same_orientations: u8,
}

impl MapsConfig {
    pub fn new(neighborhood_per_level: Vec<usize>) -> Self {
        Self {
            neighborhood_per_level,
            ..Default::default()
        }
    }

    pub fn levels(&self) -> usize {
        self.neighborhood_per_level.len()
    }
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            min_gradient_magnitude: 35,
            neighborhood_per_level: vec![5],
            min_same_orientations: 4,
        }
    }
}

/// Default percentage of the maximum similarity a match must reach.
pub const DEFAULT_MIN_MATCHING_PERCENTAGE: f32 = 85.0;
