use crate::config::MapsConfig;
use crate::image::{Image, ImageView, Size};
use crate::{feature_map, gradient, Error, Result, MAX_FEATURE_SIMILARITY, NUM_ORIENTATIONS};
use log::*;
use ndarray::{s, Array2, ArrayView2};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::path::Path;

/// Similarity of a one-hot `source` orientation to a set of spread `destination`
/// orientations: the maximum minus the smallest bit distance, saturating at zero.
/// Distances do not wrap around the 8 bins.
const fn bit_similarity(destination: u8, source: u8) -> u8 {
    let (destination, source) = (destination as u32, source as u32);
    let max = MAX_FEATURE_SIMILARITY as u32;

    let mut left_shifts = 0;
    while (destination << left_shifts) & source == 0 && left_shifts < max {
        left_shifts += 1;
    }
    let mut right_shifts = 0;
    while (destination >> right_shifts) & source == 0 && right_shifts < max {
        right_shifts += 1;
    }

    let shifts = if left_shifts < right_shifts {
        left_shifts
    } else {
        right_shifts
    };
    (max - shifts) as u8
}

const fn similarity_table() -> [[u8; 256]; NUM_ORIENTATIONS] {
    let mut table = [[0u8; 256]; NUM_ORIENTATIONS];
    let mut angle = 0;
    while angle < NUM_ORIENTATIONS {
        let mut destination = 0;
        while destination < 256 {
            table[angle][destination] = bit_similarity(destination as u8, 1 << angle);
            destination += 1;
        }
        angle += 1;
    }
    table
}

static SIMILARITY_TABLE: [[u8; 256]; NUM_ORIENTATIONS] = similarity_table();

/// Similarity of orientation bin `angle_index` to a spread orientation mask.
///
/// # Panics
/// If `angle_index` is not a bin in `0..8`.
pub fn similarity(angle_index: u8, orientations: u8) -> u8 {
    SIMILARITY_TABLE[angle_index as usize][orientations as usize]
}

/// Per orientation response maps of a scene, stored so that a template feature reads a
/// contiguous block of memory for all search positions at once.
///
/// For neighborhood `n` the response of orientation `o` is split into `n * n` linear
/// maps, one per offset `(grid_x, grid_y)` inside an `n x n` block. Element
/// `(elem_x, elem_y)` of a linear map holds the response at pixel
/// `(grid_x + elem_x * n, grid_y + elem_y * n)`.
#[derive(Debug, Clone)]
pub struct LinearizedMaps {
    neighborhood: usize,
    image_size: Size,
    image_valid_size: Size,
    linear_map_size: Size,
    /// Indexed by orientation, then `grid_y * neighborhood + grid_x`.
    maps: Vec<Vec<Array2<u8>>>,
}

impl LinearizedMaps {
    /// Builds the maps from an orientation image (degrees or [`gradient::INVALID_ORIENTATION`]).
    pub fn new(
        orientation: ArrayView2<i32>,
        neighborhood: usize,
        min_same_orientations: u8,
    ) -> Result<Self> {
        if neighborhood == 0 {
            return Err(Error::InvalidNeighborhood(neighborhood));
        }
        let (height, width) = orientation.dim();
        let image_size = Size::new(width as i32, height as i32);
        let (map_width, map_height) = (width / neighborhood, height / neighborhood);
        let linear_map_size = Size::new(map_width as i32, map_height as i32);
        let image_valid_size = Size::new(
            (map_width * neighborhood) as i32,
            (map_height * neighborhood) as i32,
        );

        let spread = feature_map::calculate(orientation, min_same_orientations, neighborhood)?;
        let valid = spread.slice(s![..map_height * neighborhood, ..map_width * neighborhood]);
        let linearize_orientation = |angle: usize| {
            let response = valid.mapv(|orientations| SIMILARITY_TABLE[angle][orientations as usize]);
            let mut grid = Vec::with_capacity(neighborhood * neighborhood);
            for grid_y in 0..neighborhood {
                for grid_x in 0..neighborhood {
                    // Images smaller than one block have empty maps.
                    if map_width == 0 || map_height == 0 {
                        grid.push(Array2::zeros((map_height, map_width)));
                        continue;
                    }
                    let step = neighborhood as isize;
                    grid.push(
                        response
                            .slice(s![grid_y..;step, grid_x..;step])
                            .to_owned(),
                    );
                }
            }
            grid
        };
        #[cfg(not(feature = "rayon"))]
        let maps = (0..NUM_ORIENTATIONS)
            .map(linearize_orientation)
            .collect::<Vec<_>>();
        #[cfg(feature = "rayon")]
        let maps = (0..NUM_ORIENTATIONS)
            .into_par_iter()
            .map(linearize_orientation)
            .collect::<Vec<_>>();

        debug!(
            "Linearized {:?} image into {:?} maps with neighborhood {}",
            image_size, linear_map_size, neighborhood
        );
        Ok(Self {
            neighborhood,
            image_size,
            image_valid_size,
            linear_map_size,
            maps,
        })
    }

    /// Computes gradients of a gray or 3 channel image and builds its maps.
    pub fn from_image(
        image: ImageView<u8>,
        min_gradient_magnitude: i32,
        neighborhood: usize,
        min_same_orientations: u8,
    ) -> Result<Self> {
        let gradient = gradient::compute(image, min_gradient_magnitude)?;
        Self::new(gradient.orientation(), neighborhood, min_same_orientations)
    }

    pub fn neighborhood(&self) -> usize {
        self.neighborhood
    }

    pub fn image_size(&self) -> Size {
        self.image_size
    }

    /// Image size rounded down to whole neighborhoods.
    pub fn image_valid_size(&self) -> Size {
        self.image_valid_size
    }

    pub fn linear_map_size(&self) -> Size {
        self.linear_map_size
    }

    /// The linear map of orientation `angle_index` for offset `(grid_x, grid_y)`.
    pub fn linear_map(&self, angle_index: u8, grid_x: usize, grid_y: usize) -> ArrayView2<u8> {
        self.maps[angle_index as usize][grid_y * self.neighborhood + grid_x].view()
    }

    /// Finds the linear map containing pixel `(x, y)` for orientation `angle_index`, and
    /// the element of that map corresponding to the pixel.
    pub fn map_element(&self, x: usize, y: usize, angle_index: u8) -> (ArrayView2<u8>, (usize, usize)) {
        let n = self.neighborhood;
        (self.linear_map(angle_index, x % n, y % n), (x / n, y / n))
    }
}

/// Linearized maps of a scene at several resolutions, finest level first.
#[derive(Debug, Clone)]
pub struct LinearizedMapPyramid {
    levels: Vec<LinearizedMaps>,
}

impl LinearizedMapPyramid {
    pub fn new(levels: Vec<LinearizedMaps>) -> Self {
        Self { levels }
    }

    /// Builds one level per configured neighborhood, halving the image between levels.
    pub fn from_image(image: ImageView<u8>, config: &MapsConfig) -> Result<Self> {
        let mut levels = Vec::with_capacity(config.levels());
        let mut current = image.to_image();
        for (level, &neighborhood) in config.neighborhood_per_level.iter().enumerate() {
            if level > 0 {
                current = current.view().pyr_down();
            }
            trace!("Building linearized maps for level {}", level);
            levels.push(LinearizedMaps::from_image(
                current.view(),
                config.min_gradient_magnitude,
                neighborhood,
                config.min_same_orientations,
            )?);
        }
        Ok(Self { levels })
    }

    /// Loads an image file and builds its map pyramid.
    pub fn from_path(path: impl AsRef<Path>, config: &MapsConfig) -> Result<Self> {
        let image = Image::open(path)?;
        Self::from_image(image.view(), config)
    }

    pub fn levels(&self) -> &[LinearizedMaps] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
