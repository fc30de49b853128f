//! Quantization of gradient orientations into one-hot orientation bins.
//!
//! The pipeline is [`quantize_orientations`], [`retain_important_orientations`] and
//! optionally [`spread_orientations`]. [`calculate`] runs all three.

use crate::gradient::INVALID_ORIENTATION;
use crate::{Error, Result, NUM_ORIENTATIONS};
use log::*;
use ndarray::{azip, s, Array2, ArrayView2, Zip};

/// Bin assigned to pixels with [`INVALID_ORIENTATION`].
pub const INVALID_QUANTIZED_ORIENTATION: u8 = NUM_ORIENTATIONS as u8 + 1;

/// Largest accepted `min_same_orientations`, the size of a 3x3 neighborhood.
pub const MAX_SAME_ORIENTATIONS: u8 = 9;

const QUANTIZATION_TABLE_LEN: usize = INVALID_ORIENTATION as usize + 1;

/// Maps `0..=360` degrees to `round(angle * 16 / 360) & 7`.
///
/// Half way values never occur for integer angles, so `(4 * angle + 45) / 90` is
/// an exact integer form of the rounding.
const fn quantization_table() -> [u8; QUANTIZATION_TABLE_LEN] {
    let mut table = [0u8; QUANTIZATION_TABLE_LEN];
    let mut angle = 0;
    while angle <= 360 {
        table[angle] = (((4 * angle + 45) / 90) & (NUM_ORIENTATIONS - 1)) as u8;
        angle += 1;
    }
    table[INVALID_ORIENTATION as usize] = INVALID_QUANTIZED_ORIENTATION;
    table
}

static QUANTIZATION_TABLE: [u8; QUANTIZATION_TABLE_LEN] = quantization_table();

/// Quantizes an orientation in degrees into one of the 8 bins.
///
/// Anything outside `0..=360` is treated as invalid.
pub fn quantize(angle: i32) -> u8 {
    usize::try_from(angle)
        .ok()
        .and_then(|angle| QUANTIZATION_TABLE.get(angle).copied())
        .unwrap_or(INVALID_QUANTIZED_ORIENTATION)
}

pub fn quantize_orientations(orientation: ArrayView2<i32>) -> Array2<u8> {
    orientation.mapv(quantize)
}

/// Keeps interior pixels whose 3x3 neighborhood agrees on one orientation bin.
///
/// The output holds the one-hot mask `1 << bin` of the most voted bin when it got
/// at least `min_same_orientations` votes, and `0` otherwise. Ties go to the
/// lowest bin. Pixels with an invalid bin of their own are never retained.
pub fn retain_important_orientations(
    quantized: ArrayView2<u8>,
    min_same_orientations: u8,
) -> Result<Array2<u8>> {
    if min_same_orientations > MAX_SAME_ORIENTATIONS {
        return Err(Error::InvalidMinSameOrientations(min_same_orientations));
    }
    let (height, width) = quantized.dim();
    let mut retained = Array2::zeros((height, width));
    if height < 3 || width < 3 {
        return Ok(retained);
    }

    let mut interior = retained.slice_mut(s![1..height - 1, 1..width - 1]);
    Zip::indexed(&mut interior).for_each(|(y, x), out| {
        let window = quantized.slice(s![y..y + 3, x..x + 3]);
        if window[[1, 1]] as usize >= NUM_ORIENTATIONS {
            return;
        }

        let mut histogram = [0u8; INVALID_QUANTIZED_ORIENTATION as usize + 1];
        for &bin in window.iter() {
            if let Some(votes) = histogram.get_mut(bin as usize) {
                *votes += 1;
            }
        }

        let mut best_bin = 0;
        for bin in 1..NUM_ORIENTATIONS {
            if histogram[bin] > histogram[best_bin] {
                best_bin = bin;
            }
        }
        if histogram[best_bin] >= min_same_orientations {
            *out = 1 << best_bin;
        }
    });

    Ok(retained)
}

/// ORs every pixel with the `neighborhood x neighborhood` block to its bottom right.
///
/// Pixels whose block would leave the image stay `0`.
pub fn spread_orientations(quantized: ArrayView2<u8>, neighborhood: usize) -> Result<Array2<u8>> {
    if neighborhood == 0 {
        return Err(Error::InvalidNeighborhood(neighborhood));
    }
    let (height, width) = quantized.dim();
    let mut spread = Array2::zeros((height, width));
    if neighborhood > height || neighborhood > width {
        return Ok(spread);
    }

    let (spread_height, spread_width) = (height - neighborhood + 1, width - neighborhood + 1);
    let mut destination = spread.slice_mut(s![..spread_height, ..spread_width]);
    for row in 0..neighborhood {
        for col in 0..neighborhood {
            azip!((
                out in &mut destination,
                &source in quantized.slice(s![row..row + spread_height, col..col + spread_width]),
            ) {
                *out |= source;
            });
        }
    }

    Ok(spread)
}

/// Quantizes, filters and, for `neighborhood > 1`, spreads an orientation image.
pub fn calculate(
    orientation: ArrayView2<i32>,
    min_same_orientations: u8,
    neighborhood: usize,
) -> Result<Array2<u8>> {
    let quantized = quantize_orientations(orientation);
    let retained = retain_important_orientations(quantized.view(), min_same_orientations)?;
    trace!("Retained important orientations.");
    if neighborhood > 1 {
        debug!("Spreading orientations over {0}x{0} blocks", neighborhood);
        spread_orientations(retained.view(), neighborhood)
    } else {
        Ok(retained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient;
    use crate::image::Image;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    #[test]
    fn quantization_bins() {
        assert_eq!(quantize(0), 0);
        assert_eq!(quantize(11), 0);
        assert_eq!(quantize(12), 1);
        assert_eq!(quantize(45), 2);
        assert_eq!(quantize(180), 0);
        assert_eq!(quantize(350), 0);
        assert_eq!(quantize(360), 0);
        assert_eq!(quantize(INVALID_ORIENTATION), INVALID_QUANTIZED_ORIENTATION);
        assert_eq!(quantize(-1), INVALID_QUANTIZED_ORIENTATION);
        for angle in 0..=360 {
            let expected = ((angle as f64 * 16.0 / 360.0).round() as u8) & 7;
            assert_eq!(quantize(angle), expected, "angle {}", angle);
        }
    }

    #[test]
    fn retain_takes_majority() {
        let quantized = array![[2, 2, 2], [2, 3, 3], [3, 3, INVALID_QUANTIZED_ORIENTATION]];
        let retained = retain_important_orientations(quantized.view(), 4).unwrap();
        assert_eq!(retained[[1, 1]], 1 << 2);
        assert_eq!(retained.iter().filter(|&&v| v != 0).count(), 1);

        let retained = retain_important_orientations(quantized.view(), 5).unwrap();
        assert_eq!(retained[[1, 1]], 0);
    }

    #[test]
    fn retain_skips_invalid_center() {
        let quantized = array![[1, 1, 1], [1, INVALID_QUANTIZED_ORIENTATION, 1], [1, 1, 1]];
        let retained = retain_important_orientations(quantized.view(), 4).unwrap();
        assert_eq!(retained[[1, 1]], 0);
    }

    #[test]
    fn retain_rejects_bad_vote_count() {
        let quantized = Array2::<u8>::zeros((5, 5));
        assert!(matches!(
            retain_important_orientations(quantized.view(), 10),
            Err(Error::InvalidMinSameOrientations(10))
        ));
    }

    #[test]
    fn spread_is_or_of_block() {
        let mut rng = Pcg64::seed_from_u64(7);
        let source = Array2::from_shape_fn((12, 9), |_| 1u8 << rng.gen_range(0..8));
        let spread = spread_orientations(source.view(), 3).unwrap();
        for ((y, x), &value) in spread.indexed_iter() {
            if y + 3 > 12 || x + 3 > 9 {
                assert_eq!(value, 0);
            } else {
                let expected = source
                    .slice(s![y..y + 3, x..x + 3])
                    .fold(0u8, |acc, &v| acc | v);
                assert_eq!(value, expected);
            }
        }
        assert_eq!(spread_orientations(source.view(), 1).unwrap(), source);
        assert!(spread_orientations(source.view(), 0).is_err());
    }

    #[test]
    fn square_is_retained_along_edges() {
        let mut image = Image::<u8>::new(64, 64, 1);
        for y in 20..44 {
            for x in 20..44 {
                image[[y, x, 0]] = 255;
            }
        }
        let gradient = gradient::compute(image.view(), 35).unwrap();
        let retained = calculate(gradient.orientation(), 4, 1).unwrap();

        assert!(retained.iter().any(|&v| v != 0));
        for ((y, x), &value) in retained.indexed_iter() {
            if value != 0 {
                assert_eq!(value.count_ones(), 1);
                assert_ne!(gradient.orientation[[y, x]], INVALID_ORIENTATION);
            }
        }
        // Left edge of the square points along the x axis.
        assert_eq!(retained[[30, 20]], 1 << quantize(180));
    }
}
