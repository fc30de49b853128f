use crate::config::TemplateConfig;
use crate::feature::Feature;
use crate::image::{Image, ImageView, Rect, Size};
use crate::{feature_map, gradient, Error, Result, MAX_NUM_FEATURES};
use log::*;
use ndarray::{Array2, ArrayView2};
use std::cmp::Reverse;
use std::path::Path;

/// Minimum distance between features the scattering filter starts with.
pub const INITIAL_SCATTER_DISTANCE: i32 = 50;

/// The scattering filter never relaxes below this distance.
pub const MIN_SCATTER_DISTANCE: i32 = 1;

/// Mask pixels at or below this value are cleared.
const MASK_THRESHOLD: u8 = 191;

/// What kind of template this is, beyond its features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKind {
    Plain,
    /// Carries a binary mask of the object, cropped to the template bounding box.
    Masked { mask: Array2<u8> },
}

/// A set of scattered features describing an object at one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    features: Vec<Feature>,
    size: Size,
    class_label: String,
    kind: TemplateKind,
}

impl Template {
    /// Creates a plain template from features already relative to its origin.
    pub fn new(features: Vec<Feature>, size: Size, class_label: impl Into<String>) -> Self {
        Self {
            features,
            size,
            class_label: class_label.into(),
            kind: TemplateKind::Plain,
        }
    }

    /// Turns this template into a masked one.
    pub fn with_mask(self, mask: Array2<u8>) -> Self {
        Self {
            kind: TemplateKind::Masked { mask },
            ..self
        }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    pub fn kind(&self) -> &TemplateKind {
        &self.kind
    }

    pub fn mask(&self) -> Option<ArrayView2<u8>> {
        match &self.kind {
            TemplateKind::Plain => None,
            TemplateKind::Masked { mask } => Some(mask.view()),
        }
    }

    /// Extracts a template from a gray or 3 channel image.
    ///
    /// # Arguments
    /// * `image` - The source image.
    /// * `min_feature_strength` - Minimum gradient magnitude of a feature.
    /// * `min_same_orientations` - Votes needed for a stable orientation.
    /// * `max_features` - Upper bound of the number of features.
    /// * `class_label` - Label of the object.
    pub fn from_image(
        image: ImageView<u8>,
        min_feature_strength: i32,
        min_same_orientations: u8,
        max_features: usize,
        class_label: &str,
    ) -> Result<Self> {
        let extracted = ExtractedFeatures::from_image(
            image,
            min_feature_strength,
            min_same_orientations,
            max_features,
        )?;
        Ok(extracted.into_template(class_label))
    }

    /// Extracts a template from a gray image of a bright object on a black background
    /// and keeps the object mask next to it.
    ///
    /// The mask is the source cropped to the template bounding box. It is inverted if
    /// its top-left pixel is not black, then every value up to 191 is cleared.
    pub fn from_image_with_mask(
        image: ImageView<u8>,
        min_feature_strength: i32,
        min_same_orientations: u8,
        max_features: usize,
        class_label: &str,
    ) -> Result<Self> {
        if image.channels() != 1 {
            return Err(Error::MaskRequiresGrayImage);
        }
        let extracted = ExtractedFeatures::from_image(
            image,
            min_feature_strength,
            min_same_orientations,
            max_features,
        )?;

        let mut mask = if extracted.bounding_rect.is_empty() {
            Array2::zeros((0, 0))
        } else {
            image.sub_view(extracted.bounding_rect)?.channel(0).to_owned()
        };
        if mask.get((0, 0)).map_or(false, |&corner| corner != 0) {
            mask.mapv_inplace(|v| u8::MAX - v);
        }
        mask.mapv_inplace(|v| if v > MASK_THRESHOLD { v } else { 0 });

        Ok(extracted.into_template(class_label).with_mask(mask))
    }
}

/// Features picked from an orientation map, still in image coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFeatures {
    pub features: Vec<Feature>,
    /// Tight bounding box of `features`.
    pub bounding_rect: Rect,
    /// Distance the scattering filter ended at. No two features are closer than this.
    pub scatter_distance: i32,
}

impl ExtractedFeatures {
    /// Picks at most `max_features` scattered features out of the non zero pixels of
    /// `quantized`, preferring the ones with the largest `importance`.
    pub fn extract(
        quantized: ArrayView2<u8>,
        importance: ArrayView2<i32>,
        max_features: usize,
    ) -> Self {
        let candidates = feature_candidates(quantized, importance);
        let (features, scatter_distance) = scatter(&candidates, max_features);
        let bounding_rect = bounding_rect(&features);
        debug!(
            "Selected {} of {} candidates at distance {}, bounding box {:?}",
            features.len(),
            candidates.len(),
            scatter_distance,
            bounding_rect
        );
        Self {
            features,
            bounding_rect,
            scatter_distance,
        }
    }

    /// Runs gradient computation and orientation filtering, then extracts features
    /// ranked by squared gradient magnitude.
    pub fn from_image(
        image: ImageView<u8>,
        min_feature_strength: i32,
        min_same_orientations: u8,
        max_features: usize,
    ) -> Result<Self> {
        let gradient = gradient::compute(image, min_feature_strength)?;
        let quantized = feature_map::calculate(gradient.orientation(), min_same_orientations, 1)?;
        Ok(Self::extract(
            quantized.view(),
            gradient.magnitude_sqr(),
            max_features,
        ))
    }

    /// Moves the features so the bounding box starts at the origin.
    pub fn into_template(self, class_label: &str) -> Template {
        let Rect { x, y, .. } = self.bounding_rect;
        let features = self
            .features
            .iter()
            .map(|f| f.at((f.x - x).max(0), (f.y - y).max(0)))
            .collect();
        Template::new(features, self.bounding_rect.size(), class_label)
    }
}

/// Every non zero pixel of a one-hot orientation map, sorted by descending importance.
///
/// Pixels holding more than one orientation are skipped. Equal importance keeps scan order.
pub fn feature_candidates(quantized: ArrayView2<u8>, importance: ArrayView2<i32>) -> Vec<Feature> {
    let mut candidates = quantized
        .indexed_iter()
        .filter(|&(_, &orientation)| orientation != 0)
        .filter_map(|((y, x), &orientation)| {
            let magnitude = importance.get((y, x)).copied().unwrap_or(0);
            Feature::from_binary(x as i32, y as i32, orientation, magnitude)
        })
        .collect::<Vec<_>>();
    candidates.sort_by_key(|f| Reverse(f.magnitude));
    candidates
}

/// Greedily accepts candidates that keep a minimum distance to all accepted ones.
///
/// Each pass over the candidates that does not fill `max_features` relaxes the
/// distance by one, down to [`MIN_SCATTER_DISTANCE`]. Returns the features and the
/// distance the filter ended at.
pub fn scatter(candidates: &[Feature], max_features: usize) -> (Vec<Feature>, i32) {
    let max_features = max_features.min(MAX_NUM_FEATURES);
    let mut distance = INITIAL_SCATTER_DISTANCE;
    let mut selected: Vec<Feature> = Vec::with_capacity(max_features);
    if candidates.is_empty() || max_features == 0 {
        return (selected, distance);
    }

    loop {
        let distance_sqr = distance * distance;
        for candidate in candidates {
            if selected.len() >= max_features {
                break;
            }
            if selected
                .iter()
                .all(|f| f.distance_sqr(candidate) >= distance_sqr)
            {
                selected.push(*candidate);
            }
        }
        if selected.len() >= max_features || distance <= MIN_SCATTER_DISTANCE {
            break;
        }
        distance -= 1;
        trace!("Relaxing scatter distance to {}", distance);
    }

    (selected, distance)
}

/// Smallest rectangle containing every feature position. Empty for no features.
pub fn bounding_rect(features: &[Feature]) -> Rect {
    let Some(first) = features.first() else {
        return Rect::default();
    };
    let (min_x, min_y, max_x, max_y) = features.iter().fold(
        (first.x, first.y, first.x, first.y),
        |(min_x, min_y, max_x, max_y), f| {
            (min_x.min(f.x), min_y.min(f.y), max_x.max(f.x), max_y.max(f.y))
        },
    );
    Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}

/// One template per pyramid level, finest level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePyramid {
    templates: Vec<Template>,
}

impl TemplatePyramid {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn levels(&self) -> usize {
        self.templates.len()
    }

    pub fn class_label(&self) -> Option<&str> {
        self.templates.first().map(Template::class_label)
    }

    /// Builds a plain template pyramid from a gray or 3 channel image.
    ///
    /// Returns `Ok(None)` if any level ends up with fewer than
    /// `config.min_number_of_features` features.
    pub fn from_image(
        image: ImageView<u8>,
        class_label: &str,
        config: &TemplateConfig,
    ) -> Result<Option<Self>> {
        Self::build(image, config, |view, max_features| {
            Template::from_image(
                view,
                config.min_feature_strength,
                config.min_same_orientations,
                max_features,
                class_label,
            )
        })
    }

    /// Builds a masked template pyramid from a gray image. See
    /// [`Template::from_image_with_mask`].
    pub fn from_image_with_mask(
        image: ImageView<u8>,
        class_label: &str,
        config: &TemplateConfig,
    ) -> Result<Option<Self>> {
        Self::build(image, config, |view, max_features| {
            Template::from_image_with_mask(
                view,
                config.min_feature_strength,
                config.min_same_orientations,
                max_features,
                class_label,
            )
        })
    }

    /// Loads an image file and builds a plain template pyramid from it.
    pub fn from_path(
        path: impl AsRef<Path>,
        class_label: &str,
        config: &TemplateConfig,
    ) -> Result<Option<Self>> {
        let image = Image::open(path)?;
        Self::from_image(image.view(), class_label, config)
    }

    fn build(
        image: ImageView<u8>,
        config: &TemplateConfig,
        build_level: impl Fn(ImageView<u8>, usize) -> Result<Template>,
    ) -> Result<Option<Self>> {
        let mut templates = Vec::with_capacity(config.levels());
        let mut current = image.to_image();
        for (level, &max_features) in config.max_features_per_level.iter().enumerate() {
            if level > 0 {
                current = current.view().pyr_down();
            }
            let template = build_level(current.view(), max_features)?;
            if template.features().len() < config.min_number_of_features {
                debug!(
                    "Level {} has {} features, fewer than the required {}",
                    level,
                    template.features().len(),
                    config.min_number_of_features
                );
                return Ok(None);
            }
            trace!("Built level {} with {} features", level, template.features().len());
            templates.push(template);
        }
        info!(
            "Built a {} level template pyramid for {:?}",
            templates.len(),
            templates.first().map(Template::class_label)
        );
        Ok(Some(Self { templates }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn square_image(channels: usize) -> Image<u8> {
        let mut image = Image::<u8>::new(64, 64, channels);
        for y in 16..48 {
            for x in 16..48 {
                for c in 0..channels {
                    image[[y, x, c]] = 255;
                }
            }
        }
        image
    }

    fn random_candidates(count: usize, seed: u64) -> Vec<Feature> {
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut positions = std::collections::HashSet::new();
        while positions.len() < count {
            positions.insert((rng.gen_range(0..80), rng.gen_range(0..80)));
        }
        let mut candidates = positions
            .into_iter()
            .map(|(x, y)| Feature::new(x, y, rng.gen_range(0..8), rng.gen_range(0..1000)).unwrap())
            .collect::<Vec<_>>();
        candidates.sort_by_key(|f| (Reverse(f.magnitude), f.y, f.x));
        candidates
    }

    #[test]
    fn scatter_keeps_final_distance() {
        for seed in 0..4 {
            let candidates = random_candidates(300, seed);
            let (features, distance) = scatter(&candidates, 60);
            assert_eq!(features.len(), 60);
            assert!(distance >= MIN_SCATTER_DISTANCE);
            for (i, a) in features.iter().enumerate() {
                for b in &features[i + 1..] {
                    assert!(a.distance_sqr(b) >= distance * distance);
                }
            }
        }
    }

    #[test]
    fn scatter_terminates_with_too_few_candidates() {
        let candidates = random_candidates(20, 9);
        let (features, distance) = scatter(&candidates, 100);
        assert_eq!(features.len(), 20);
        assert_eq!(distance, MIN_SCATTER_DISTANCE);
        assert_eq!(scatter(&[], 10).0.len(), 0);
    }

    #[test]
    fn scatter_prefers_important_candidates() {
        let candidates = random_candidates(100, 3);
        let (features, _) = scatter(&candidates, 1);
        assert_eq!(features, vec![candidates[0]]);
    }

    #[test]
    fn bounding_rect_is_tight() {
        let features = vec![
            Feature::new(5, 9, 0, 0).unwrap(),
            Feature::new(3, 12, 1, 0).unwrap(),
            Feature::new(8, 10, 2, 0).unwrap(),
        ];
        assert_eq!(bounding_rect(&features), Rect::new(3, 9, 6, 4));
        assert!(bounding_rect(&[]).is_empty());
    }

    #[test]
    fn square_template() {
        let image = square_image(1);
        let template = Template::from_image(image.view(), 40, 4, 100, "square").unwrap();
        let features = template.features();
        assert_eq!(features.len(), 100);
        assert_eq!(template.class_label(), "square");
        assert_eq!(template.kind(), &TemplateKind::Plain);

        let max_x = features.iter().map(|f| f.x).max().unwrap();
        let max_y = features.iter().map(|f| f.y).max().unwrap();
        assert_eq!(features.iter().map(|f| f.x).min(), Some(0));
        assert_eq!(features.iter().map(|f| f.y).min(), Some(0));
        assert_eq!(template.size(), Size::new(max_x + 1, max_y + 1));
        assert!(features.iter().all(|f| f.angle_binary().count_ones() == 1));
    }

    #[test]
    fn masked_template() {
        let image = square_image(1);
        let template = Template::from_image_with_mask(image.view(), 40, 4, 100, "square").unwrap();
        let mask = template.mask().unwrap();
        let size = template.size();
        assert_eq!(mask.dim(), (size.height as usize, size.width as usize));
        // The bounding box starts on the dark outer edge, so the mask is not inverted.
        assert_eq!(mask[[0, 0]], 0);
        assert!(mask.iter().all(|&v| v == 0 || v == 255));
        assert!(mask.iter().any(|&v| v == 255));

        let inverted = {
            let mut image = square_image(1);
            image.mapv_inplace(|v| 255 - v);
            image
        };
        let template =
            Template::from_image_with_mask(inverted.view(), 40, 4, 100, "square").unwrap();
        let mask = template.mask().unwrap();
        assert_eq!(mask[[0, 0]], 0);
        assert!(mask.iter().any(|&v| v == 255));
    }

    #[test]
    fn masked_template_rejects_color() {
        let image = square_image(3);
        assert!(matches!(
            Template::from_image_with_mask(image.view(), 40, 4, 100, "square"),
            Err(Error::MaskRequiresGrayImage)
        ));
    }

    #[test]
    fn pyramid_needs_enough_features() {
        let image = square_image(1);
        let config = TemplateConfig::new(vec![100, 50]);
        let pyramid = TemplatePyramid::from_image(image.view(), "square", &config)
            .unwrap()
            .unwrap();
        assert_eq!(pyramid.levels(), 2);
        assert!(pyramid.templates()[1].size().width < pyramid.templates()[0].size().width);

        let strict = TemplateConfig {
            min_number_of_features: 1000,
            ..config
        };
        assert!(TemplatePyramid::from_image(image.view(), "square", &strict)
            .unwrap()
            .is_none());

        let blank = Image::<u8>::new(64, 64, 1);
        assert!(TemplatePyramid::from_image(blank.view(), "blank", &TemplateConfig::default())
            .unwrap()
            .is_none());
    }
}
