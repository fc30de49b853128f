use crate::image::{Rect, Size};
use crate::linear_maps::{LinearizedMapPyramid, LinearizedMaps};
use crate::matches::Match;
use crate::template::{Template, TemplatePyramid};
use crate::{Error, Result, MAX_FEATURES_PER_BYTE_FLUSH, MAX_FEATURE_SIMILARITY};
use log::*;
use ndarray::{azip, s, Array2};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Similarity accumulators reused between searches of the same size.
#[derive(Debug, Default)]
struct SimilarityBuffers {
    similarity: Array2<i16>,
    bytes: Array2<u8>,
}

impl SimilarityBuffers {
    fn reset(&mut self, rows: usize, cols: usize) {
        if self.similarity.dim() != (rows, cols) {
            self.similarity = Array2::zeros((rows, cols));
            self.bytes = Array2::zeros((rows, cols));
        } else {
            self.similarity.fill(0);
            self.bytes.fill(0);
        }
    }

    fn flush(&mut self) {
        azip!((total in &mut self.similarity, &partial in &self.bytes) {
            *total = total.saturating_add(i16::from(partial));
        });
        self.bytes.fill(0);
    }
}

/// Sums the similarities of every template feature for each template position in `area`.
///
/// Cell `(row, col)` of the result scores the template placed with its origin at
/// `(area.x + col * n, area.y + row * n)` for neighborhood `n`. Lookups falling outside
/// the linearized maps contribute nothing.
fn accumulate(maps: &LinearizedMaps, template: &Template, area: Rect, buffers: &mut SimilarityBuffers) {
    let n = maps.neighborhood();
    let cols = area.width.max(0) as usize / n;
    let rows = area.height.max(0) as usize / n;
    buffers.reset(rows, cols);

    let mut pending = 0;
    for feature in template.features() {
        let x = (feature.x + area.x).max(0) as usize;
        let y = (feature.y + area.y).max(0) as usize;
        let (map, (elem_x, elem_y)) = maps.map_element(x, y, feature.angle_index());
        let (map_rows, map_cols) = map.dim();
        let valid_rows = map_rows.saturating_sub(elem_y).min(rows);
        let valid_cols = map_cols.saturating_sub(elem_x).min(cols);
        if valid_rows != 0 && valid_cols != 0 {
            azip!((
                sum in buffers.bytes.slice_mut(s![..valid_rows, ..valid_cols]),
                &response in map.slice(s![elem_y..elem_y + valid_rows, elem_x..elem_x + valid_cols]),
            ) {
                *sum += response;
            });
        }

        pending += 1;
        if pending == MAX_FEATURES_PER_BYTE_FLUSH {
            buffers.flush();
            pending = 0;
        }
    }
    if pending != 0 {
        buffers.flush();
    }
}

/// Raw similarity map of `template` over `area`.
///
/// Cell `(row, col)` holds the summed feature similarities of the template placed at
/// `(area.x + col * n, area.y + row * n)`, where `n` is the neighborhood of `maps`.
pub fn similarity_map(maps: &LinearizedMaps, template: &Template, area: Rect) -> Array2<i16> {
    let mut buffers = SimilarityBuffers::default();
    accumulate(maps, template, area, &mut buffers);
    buffers.similarity
}

/// Window searched at a finer pyramid level around the seed `(seed_x, seed_y)`.
pub fn refinement_search_area(
    seed_x: i32,
    seed_y: i32,
    previous_neighborhood: usize,
    image_valid_size: Size,
) -> Rect {
    let previous_neighborhood = previous_neighborhood as i32;
    Rect::new(
        (seed_x - previous_neighborhood).max(0),
        (seed_y - previous_neighborhood).max(0),
        2 * previous_neighborhood,
        2 * previous_neighborhood,
    )
    .intersect(&Rect::from_size(image_valid_size))
}

impl LinearizedMaps {
    fn match_in_area<'t>(
        &self,
        template: &'t Template,
        area: Rect,
        min_matching_percentage: f32,
        filter_partial_objects: bool,
        buffers: &mut SimilarityBuffers,
    ) -> Vec<Match<'t>> {
        let size = template.size();
        let valid = self.image_valid_size();
        if size.width > valid.width || size.height > valid.height || template.features().is_empty() {
            return Vec::new();
        }

        accumulate(self, template, area, buffers);

        let raw_score_scale =
            100.0 / (f32::from(MAX_FEATURE_SIMILARITY) * template.features().len() as f32);
        let min_raw_score = (min_matching_percentage / raw_score_scale).round() as i32;
        let n = self.neighborhood() as i32;
        let alignment = n / 2;
        let image_width = self.image_size().width;

        let matches = buffers
            .similarity
            .indexed_iter()
            .filter(|&(_, &raw)| i32::from(raw) >= min_raw_score)
            .map(|((row, col), &raw)| Match {
                x: col as i32 * n + alignment + area.x,
                y: row as i32 * n + alignment + area.y,
                score: f32::from(raw) * raw_score_scale,
                template,
            })
            .filter(|m| !filter_partial_objects || m.x + size.width <= image_width)
            .collect::<Vec<_>>();
        trace!(
            "{} matches of {:?} in {:?} over raw score {}",
            matches.len(),
            template.class_label(),
            area,
            min_raw_score
        );
        matches
    }

    /// Matches a template over the whole image.
    ///
    /// Every `n x n` block of the image yields one candidate position. A template too
    /// large for the image simply has no matches.
    pub fn match_template<'t>(
        &self,
        template: &'t Template,
        min_matching_percentage: f32,
    ) -> Vec<Match<'t>> {
        let area = Rect::from_size(self.image_size());
        let mut buffers = SimilarityBuffers::default();
        self.match_in_area(template, area, min_matching_percentage, true, &mut buffers)
    }

    /// Matches a template inside `area`, which must lie inside the image.
    pub fn match_template_in<'t>(
        &self,
        template: &'t Template,
        area: Rect,
        min_matching_percentage: f32,
    ) -> Result<Vec<Match<'t>>> {
        if !Rect::from_size(self.image_size()).contains_rect(&area) {
            return Err(Error::SearchAreaOutOfBounds {
                area,
                image: self.image_size(),
            });
        }
        let mut buffers = SimilarityBuffers::default();
        Ok(self.match_in_area(template, area, min_matching_percentage, true, &mut buffers))
    }

    /// Matches every template over the whole image. Templates are processed in parallel
    /// with the `rayon` feature; the result keeps template order.
    pub fn match_templates<'t>(
        &self,
        templates: &'t [Template],
        min_matching_percentage: f32,
    ) -> Vec<Match<'t>> {
        let match_one = |template: &'t Template| self.match_template(template, min_matching_percentage);
        #[cfg(not(feature = "rayon"))]
        let per_template = templates.iter().map(match_one).collect::<Vec<_>>();
        #[cfg(feature = "rayon")]
        let per_template = templates.par_iter().map(match_one).collect::<Vec<_>>();
        per_template.into_iter().flatten().collect()
    }
}

impl LinearizedMapPyramid {
    /// Matches a template pyramid coarse to fine.
    ///
    /// The coarsest level is searched everywhere. Each match seeds a small search at
    /// the next finer level, and the matches of the finest level are returned. Matches
    /// running past the right image edge are dropped at every level but the finest.
    pub fn match_template<'t>(
        &self,
        pyramid: &'t TemplatePyramid,
        min_matching_percentage: f32,
    ) -> Result<Vec<Match<'t>>> {
        let levels = self.levels();
        let templates = pyramid.templates();
        if levels.len() != templates.len() {
            return Err(Error::PyramidLevelMismatch {
                maps: levels.len(),
                templates: templates.len(),
            });
        }
        let Some(coarsest) = levels.len().checked_sub(1) else {
            return Ok(Vec::new());
        };

        let mut buffers = SimilarityBuffers::default();
        let area = Rect::from_size(levels[coarsest].image_size());
        let mut matches = levels[coarsest].match_in_area(
            &templates[coarsest],
            area,
            min_matching_percentage,
            true,
            &mut buffers,
        );
        debug!("{} candidates at level {}", matches.len(), coarsest);

        for level in (0..coarsest).rev() {
            let maps = &levels[level];
            let previous_neighborhood = levels[level + 1].neighborhood();
            let mut refined = Vec::new();
            for candidate in &matches {
                let area = refinement_search_area(
                    candidate.x * 2 + 1,
                    candidate.y * 2 + 1,
                    previous_neighborhood,
                    maps.image_valid_size(),
                );
                refined.extend(maps.match_in_area(
                    &templates[level],
                    area,
                    min_matching_percentage,
                    level != 0,
                    &mut buffers,
                ));
            }
            debug!("{} candidates at level {}", refined.len(), level);
            matches = refined;
        }

        Ok(matches)
    }

    /// Matches every template pyramid. Pyramids are processed in parallel with the
    /// `rayon` feature; the result keeps pyramid order.
    pub fn match_templates<'t>(
        &self,
        pyramids: &'t [TemplatePyramid],
        min_matching_percentage: f32,
    ) -> Result<Vec<Match<'t>>> {
        let match_one = |pyramid: &'t TemplatePyramid| self.match_template(pyramid, min_matching_percentage);
        #[cfg(not(feature = "rayon"))]
        let per_pyramid = pyramids.iter().map(match_one).collect::<Result<Vec<_>>>()?;
        #[cfg(feature = "rayon")]
        let per_pyramid = pyramids.par_iter().map(match_one).collect::<Result<Vec<_>>>()?;
        let matches = per_pyramid.into_iter().flatten().collect::<Vec<_>>();
        info!(
            "Found {} matches of {} template pyramids",
            matches.len(),
            pyramids.len()
        );
        Ok(matches)
    }
}
