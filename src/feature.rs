use crate::{Error, Result, NUM_ORIENTATIONS};

/// A single template feature: a position with a quantized gradient orientation.
///
/// The orientation is kept in its one-hot form, which is what gets ORed and looked up
/// while matching. Exactly one bit of it is ever set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Feature {
    /// Horizontal position, relative to the template origin once part of a template.
    pub x: i32,
    /// Vertical position, relative to the template origin once part of a template.
    pub y: i32,
    /// Squared gradient magnitude which ranked this feature during extraction.
    pub magnitude: i32,
    angle_binary: u8,
}

impl Feature {
    /// Creates a feature from an orientation bin index in `0..8`.
    pub fn new(x: i32, y: i32, angle_index: u8, magnitude: i32) -> Result<Self> {
        if angle_index as usize >= NUM_ORIENTATIONS {
            return Err(Error::InvalidAngleLabel(angle_index));
        }
        Ok(Self {
            x,
            y,
            magnitude,
            angle_binary: 1 << angle_index,
        })
    }

    /// Creates a feature from a one-hot orientation mask, or `None` if `angle_binary`
    /// does not have exactly one bit set.
    pub fn from_binary(x: i32, y: i32, angle_binary: u8, magnitude: i32) -> Option<Self> {
        (angle_binary.count_ones() == 1).then_some(Self {
            x,
            y,
            magnitude,
            angle_binary,
        })
    }

    /// Orientation bin, the base 2 logarithm of [`Feature::angle_binary`].
    pub fn angle_index(&self) -> u8 {
        self.angle_binary.trailing_zeros() as u8
    }

    pub fn angle_binary(&self) -> u8 {
        self.angle_binary
    }

    /// Squared euclidean distance between two feature positions.
    pub fn distance_sqr(&self, other: &Feature) -> i32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Same feature at another position.
    pub fn at(&self, x: i32, y: i32) -> Self {
        Self { x, y, ..*self }
    }

    /// Same feature moved by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        self.at(self.x + dx, self.y + dy)
    }
}
