use crate::{Error, Result};
use derive_more::{Deref, DerefMut};
use image::{DynamicImage, RgbImage};
use log::*;
use ndarray::{azip, s, Array2, Array3, ArrayView2, ArrayView3, Axis, ErrorKind, ShapeError};
use std::path::Path;

/// Primitive element type of an image channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    I16,
    I32,
    F32,
    F64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::I16 => 2,
            ElementType::I32 | ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }
}

/// A channel element which images in this crate can be made of.
pub trait Element: Copy + Default + Send + Sync + 'static {
    const TYPE: ElementType;

    fn to_f64(self) -> f64;

    /// Converts back from `f64`, rounding and saturating for integer types.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident, integer) => {
        impl Element for $t {
            const TYPE: ElementType = ElementType::$variant;

            fn to_f64(self) -> f64 {
                f64::from(self)
            }

            fn from_f64(value: f64) -> Self {
                value.round() as $t
            }
        }
    };
    ($t:ty, $variant:ident, float) => {
        impl Element for $t {
            const TYPE: ElementType = ElementType::$variant;

            fn to_f64(self) -> f64 {
                f64::from(self)
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    };
}

impl_element!(u8, U8, integer);
impl_element!(i16, I16, integer);
impl_element!(i32, I32, integer);
impl_element!(f32, F32, float);
impl_element!(f64, F64, float);

/// Width and height of an image or a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> i32 {
        self.width * self.height
    }
}

/// Axis aligned rectangle in pixel coordinates. `x` and `y` are the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle anchored at the origin covering `size`.
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// First column past the right edge.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// First row past the bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns true when `other` lies completely inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlapping part of two rectangles. Disjoint rectangles give an empty rectangle.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            Rect::default()
        } else {
            Rect::new(x, y, right - x, bottom - y)
        }
    }
}

/// An owned multi-channel image stored as a contiguous `height x width x channels` array.
///
/// The matcher itself only ever reads through [`ImageView`], so sub-rectangles
/// never copy pixel data.
#[derive(Debug, Clone, PartialEq, Deref, DerefMut)]
pub struct Image<T>(pub Array3<T>);

impl<T: Element> Image<T> {
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self(Array3::from_elem((height, width, channels), T::default()))
    }

    /// Wraps a single channel array.
    pub fn from_array2(array: Array2<T>) -> Self {
        Self(array.insert_axis(Axis(2)))
    }

    /// Builds an image from interleaved row-major pixel data.
    pub fn from_raw(width: usize, height: usize, channels: usize, data: Vec<T>) -> Result<Self> {
        Ok(Self(Array3::from_shape_vec((height, width, channels), data)?))
    }

    pub fn view(&self) -> ImageView<'_, T> {
        ImageView(self.0.view())
    }

    pub fn width(&self) -> usize {
        self.0.dim().1
    }

    pub fn height(&self) -> usize {
        self.0.dim().0
    }

    pub fn channels(&self) -> usize {
        self.0.dim().2
    }

    pub fn size(&self) -> Size {
        self.view().size()
    }
}

impl Image<u8> {
    /// Converts an image crate image. Gray images stay single channel, everything else
    /// is converted to 3 channel RGB.
    pub fn from_dynamic(input_image: &DynamicImage) -> Self {
        let (width, height) = (input_image.width() as usize, input_image.height() as usize);
        match input_image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => {
                info!("Loaded a {} x {} gray image", width, height);
                let gray = input_image.to_luma8();
                Self(
                    Array2::from_shape_fn((height, width), |(y, x)| {
                        gray[(x as u32, y as u32)][0]
                    })
                    .insert_axis(Axis(2)),
                )
            }
            _ => {
                info!("Loaded a {} x {} color image", width, height);
                let rgb = input_image.to_rgb8();
                Self(Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
                    rgb[(x as u32, y as u32)][c]
                }))
            }
        }
    }

    /// Opens an image file through the `image` crate.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_dynamic(&image::open(path)?))
    }
}

/// A borrowed, possibly strided, window onto image data.
#[derive(Debug, Clone, Copy, Deref)]
pub struct ImageView<'a, T>(pub ArrayView3<'a, T>);

impl<'a, T: Element> ImageView<'a, T> {
    /// Views a single channel array as an image.
    pub fn from_array2(array: ArrayView2<'a, T>) -> Self {
        Self(array.insert_axis(Axis(2)))
    }

    pub fn width(&self) -> usize {
        self.0.dim().1
    }

    pub fn height(&self) -> usize {
        self.0.dim().0
    }

    pub fn channels(&self) -> usize {
        self.0.dim().2
    }

    pub fn size(&self) -> Size {
        Size::new(self.width() as i32, self.height() as i32)
    }

    pub fn element_type(&self) -> ElementType {
        T::TYPE
    }

    /// Distance in bytes between the starts of two consecutive rows.
    pub fn stride(&self) -> usize {
        self.0.strides()[0] as usize * T::TYPE.size()
    }

    /// Byte offset of pixel `(x, y)` from the first pixel of this view.
    pub fn pixel_offset(&self, x: usize, y: usize) -> usize {
        y * self.stride() + x * self.0.strides()[1] as usize * T::TYPE.size()
    }

    /// One row as a `width x channels` array.
    pub fn row(&self, y: usize) -> ArrayView2<'a, T> {
        self.0.index_axis_move(Axis(0), y)
    }

    /// A single channel plane.
    pub fn channel(&self, c: usize) -> ArrayView2<'a, T> {
        self.0.index_axis_move(Axis(2), c)
    }

    /// A sub-rectangle sharing storage with `self`.
    pub fn sub_view(&self, rect: Rect) -> Result<ImageView<'a, T>> {
        if rect.is_empty() || !Rect::from_size(self.size()).contains_rect(&rect) {
            return Err(Error::RegionOutOfBounds {
                rect,
                image: self.size(),
            });
        }
        let (x, y) = (rect.x as usize, rect.y as usize);
        let (w, h) = (rect.width as usize, rect.height as usize);
        Ok(Self(self.0.slice_move(s![y..y + h, x..x + w, ..])))
    }

    pub fn to_image(&self) -> Image<T> {
        Image(self.0.to_owned())
    }

    /// Halves the resolution by averaging 2x2 tiles of every channel.
    ///
    /// Odd trailing rows and columns are dropped. The caller is expected to have
    /// blurred the image beforehand if aliasing matters.
    pub fn pyr_down(&self) -> Image<T> {
        let width = self.width() / 2;
        let height = self.height() / 2;
        let channels = self.channels();
        let mut half = Array3::from_elem((height, width, channels), T::default());
        for c in 0..channels {
            let plane = self.channel(c);
            let mut out_plane = half.index_axis_mut(Axis(2), c);
            azip!((
                out in &mut out_plane,
                window in plane.slice(s![..height * 2, ..width * 2]).exact_chunks((2, 2)),
            ) {
                *out = T::from_f64(window.iter().map(|v| v.to_f64()).sum::<f64>() * 0.25);
            });
        }
        trace!(
            "Pyramid down {}x{} -> {}x{}",
            self.width(),
            self.height(),
            width,
            height
        );
        Image(half)
    }
}

impl<'a> ImageView<'a, u8> {
    /// Single channel version of this image. Color images go through the `image` crate's
    /// luma conversion.
    pub fn to_gray(&self) -> Result<Image<u8>> {
        match self.channels() {
            1 => Ok(self.to_image()),
            3 => {
                let raw = self.0.iter().copied().collect::<Vec<u8>>();
                let rgb = RgbImage::from_raw(self.width() as u32, self.height() as u32, raw)
                    .ok_or_else(|| ShapeError::from_kind(ErrorKind::IncompatibleShape))?;
                Ok(Image::from_dynamic(&DynamicImage::ImageRgb8(rgb).grayscale()))
            }
            channels => Err(Error::UnsupportedChannelCount(channels)),
        }
    }
}
