use crate::image::ImageView;
use crate::{Error, Result};
use log::*;
use ndarray::{Array2, ArrayView2};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Orientation assigned to pixels whose gradient is too weak to be trusted.
pub const INVALID_ORIENTATION: i32 = 360 + 1;

const SOBEL_X: [[i32; 3]; 3] = [[1, 0, -1], [2, 0, -2], [1, 0, -1]];
const SOBEL_Y: [[i32; 3]; 3] = [[1, 2, 1], [0, 0, 0], [-1, -2, -1]];

const ATAN_Y_MUL: i32 = 64;

/// `round(atan(i / 64))` in degrees for `i` in `0..=64`.
const ATAN_TABLE: [i32; ATAN_Y_MUL as usize + 1] = [
    0, 1, 2, 3, 4, 4, 5, 6, 7, 8, 9, 10, 11, 11, 12, 13, 14, 15, 16, 17, 17, 18, 19, 20, 21, 21,
    22, 23, 24, 24, 25, 26, 27, 27, 28, 29, 29, 30, 31, 31, 32, 33, 33, 34, 35, 35, 36, 36, 37,
    37, 38, 39, 39, 40, 40, 41, 41, 42, 42, 43, 43, 44, 44, 45, 45,
];

/// Per-pixel Sobel gradient of an image.
///
/// The one pixel border is never computed: it keeps orientation `0` and magnitude `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gradient {
    /// Orientation in degrees (`0..=360`) or [`INVALID_ORIENTATION`].
    pub orientation: Array2<i32>,
    /// Squared gradient magnitude, `0` where the orientation is invalid.
    pub magnitude_sqr: Array2<i32>,
}

impl Gradient {
    pub fn width(&self) -> usize {
        self.orientation.dim().1
    }

    pub fn height(&self) -> usize {
        self.orientation.dim().0
    }

    pub fn orientation(&self) -> ArrayView2<i32> {
        self.orientation.view()
    }

    pub fn magnitude_sqr(&self) -> ArrayView2<i32> {
        self.magnitude_sqr.view()
    }
}

/// Approximates `atan2(dy, dx)` in integer degrees within `[0, 360]`.
///
/// The angle is folded into the first octant and looked up in a 65 entry table,
/// so the error stays below 1.4 degrees.
pub fn atan2_approx(dy: i32, dx: i32) -> i32 {
    if dy == 0 {
        return if dx >= 0 { 0 } else { 180 };
    }

    let (mut x, mut y, mut octant) = (dx, dy, 0);
    if y < 0 {
        x = -x;
        y = -y;
        octant += 4;
    }
    if x <= 0 {
        let t = x;
        x = y;
        y = -t;
        octant += 2;
    }
    if x <= y {
        let t = y - x;
        x += y;
        y = t;
        octant += 1;
    }

    45 * octant + ATAN_TABLE[(y * ATAN_Y_MUL / x) as usize]
}

/// Sobel responses of channel `c` centered on `(x, y)`.
fn sobel(image: &ImageView<u8>, x: usize, y: usize, c: usize) -> (i32, i32) {
    let mut sum_x = 0;
    let mut sum_y = 0;
    for (dy, (kx, ky)) in SOBEL_X.iter().zip(SOBEL_Y.iter()).enumerate() {
        for dx in 0..3 {
            let value = i32::from(image[[y + dy - 1, x + dx - 1, c]]);
            sum_x += kx[dx] * value;
            sum_y += ky[dx] * value;
        }
    }
    (sum_x, sum_y)
}

/// Computes gradient orientation and squared magnitude of a gray or 3 channel image.
///
/// For color images the channel with the strongest gradient wins. Pixels whose
/// magnitude is below `min_valid_magnitude` get [`INVALID_ORIENTATION`].
///
/// # Arguments
/// * `image` - 1 or 3 channel 8-bit image.
/// * `min_valid_magnitude` - Minimum (non squared) magnitude of a valid orientation.
pub fn compute(image: ImageView<u8>, min_valid_magnitude: i32) -> Result<Gradient> {
    let channels = image.channels();
    if channels != 1 && channels != 3 {
        return Err(Error::UnsupportedChannelCount(channels));
    }
    let (width, height) = (image.width(), image.height());
    let min_valid_sqr = min_valid_magnitude * min_valid_magnitude;
    let mut orientation = vec![0i32; width * height];
    let mut magnitude_sqr = vec![0i32; width * height];

    if width >= 3 && height >= 3 {
        let process_row = |y: usize, orientation_row: &mut [i32], magnitude_row: &mut [i32]| {
            for x in 1..width - 1 {
                let (mut best_x, mut best_y, mut best_sqr) = (0, 0, -1);
                for c in 0..channels {
                    let (sum_x, sum_y) = sobel(&image, x, y, c);
                    let sqr = sum_x * sum_x + sum_y * sum_y;
                    if sqr > best_sqr {
                        best_x = sum_x;
                        best_y = sum_y;
                        best_sqr = sqr;
                    }
                }
                if best_sqr < min_valid_sqr {
                    orientation_row[x] = INVALID_ORIENTATION;
                } else {
                    magnitude_row[x] = best_sqr;
                    orientation_row[x] = atan2_approx(best_y, best_x);
                }
            }
        };
        #[cfg(not(feature = "rayon"))]
        orientation
            .chunks_exact_mut(width)
            .zip(magnitude_sqr.chunks_exact_mut(width))
            .enumerate()
            .skip(1)
            .take(height - 2)
            .for_each(|(y, (orientation_row, magnitude_row))| {
                process_row(y, orientation_row, magnitude_row)
            });
        #[cfg(feature = "rayon")]
        orientation
            .par_chunks_exact_mut(width)
            .zip(magnitude_sqr.par_chunks_exact_mut(width))
            .enumerate()
            .skip(1)
            .take(height - 2)
            .for_each(|(y, (orientation_row, magnitude_row))| {
                process_row(y, orientation_row, magnitude_row)
            });
    }
    trace!("Computed {}x{} gradient over {} channels", width, height, channels);

    Ok(Gradient {
        orientation: Array2::from_shape_vec((height, width), orientation)?,
        magnitude_sqr: Array2::from_shape_vec((height, width), magnitude_sqr)?,
    })
}
