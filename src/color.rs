//! Pixel aggregation over decoded frames.
//!
//! Everything here is pure: a [`Frame`] goes in, a [`Color`] comes out. The
//! poll loop uses [`dominant_color`] by default; [`average_color`] and
//! [`mode_color`] are available through [`ColorStrategy`].

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Histogram resolution used when nothing else is configured.
pub const DEFAULT_BUCKETS: u16 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    fn from_channels(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// A decoded still frame.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Color) -> Self {
        let image = RgbImage::from_fn(width, height, |x, y| image::Rgb(f(x, y).channels()));
        Self { image }
    }

    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        Self::from_fn(width, height, |_, _| color)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self::new(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        Color::from_channels(self.image.get_pixel(x, y).0)
    }

    fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.image.pixels().map(|p| p.0)
    }
}

/// Which aggregation the sync loop applies to each fetched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorStrategy {
    #[default]
    Histogram,
    Average,
    Mode,
}

impl ColorStrategy {
    pub fn extract(&self, frame: &Frame, buckets: u16) -> Result<Color, SyncError> {
        match self {
            ColorStrategy::Histogram => Ok(dominant_color(frame, buckets)),
            ColorStrategy::Average => average_color(frame, 0, 0, frame.width(), frame.height()),
            ColorStrategy::Mode => Ok(mode_color(frame)),
        }
    }
}

/// Mean color of the `w`x`h` rectangle at (`x0`, `y0`), rounded half up.
pub fn average_color(frame: &Frame, x0: u32, y0: u32, w: u32, h: u32) -> Result<Color, SyncError> {
    let count = u64::from(w) * u64::from(h);
    if count == 0 {
        return Err(SyncError::EmptyRegion { width: w, height: h });
    }

    let fits = x0.checked_add(w).is_some_and(|x1| x1 <= frame.width())
        && y0.checked_add(h).is_some_and(|y1| y1 <= frame.height());
    if !fits {
        return Err(SyncError::OutOfBounds {
            x0,
            y0,
            width: w,
            height: h,
            frame_width: frame.width(),
            frame_height: frame.height(),
        });
    }

    let mut sums = [0u64; 3];
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            for (sum, value) in sums.iter_mut().zip(frame.pixel(x, y).channels()) {
                *sum += u64::from(value);
            }
        }
    }

    // (2 * sum + count) / (2 * count) is round(sum / count) with halves going up.
    let mean = sums.map(|sum| ((2 * sum + count) / (2 * count)) as u8);
    Ok(Color::from_channels(mean))
}

/// Per-channel histogram mode.
///
/// Each channel is binned into `buckets` equal-width bins over 0..=255 and the
/// fullest bin wins, lowest index first on ties. The reported value is the
/// bin's lower edge, so the result is only exact when `buckets` is 256. The
/// three channels are chosen independently and need not come from the same
/// pixel.
pub fn dominant_color(frame: &Frame, buckets: u16) -> Color {
    let buckets = usize::from(buckets.clamp(1, 256));
    let mut histograms = vec![[0u32; 3]; buckets];

    for pixel in frame.pixels() {
        for (channel, value) in pixel.into_iter().enumerate() {
            histograms[usize::from(value) * buckets / 256][channel] += 1;
        }
    }

    let mut result = [0u8; 3];
    for (channel, out) in result.iter_mut().enumerate() {
        let mut best = 0;
        for index in 1..buckets {
            if histograms[index][channel] > histograms[best][channel] {
                best = index;
            }
        }
        *out = (best * 256 / buckets).min(255) as u8;
    }

    Color::from_channels(result)
}

/// Most frequent literal value per channel, lowest value first on ties.
pub fn mode_color(frame: &Frame) -> Color {
    let mut counts = [[0u32; 256]; 3];
    for pixel in frame.pixels() {
        for (channel, value) in pixel.into_iter().enumerate() {
            counts[channel][usize::from(value)] += 1;
        }
    }

    let mut result = [0u8; 3];
    for (out, table) in result.iter_mut().zip(counts.iter()) {
        let mut best = 0;
        for value in 1..256 {
            if table[value] > table[best] {
                best = value;
            }
        }
        *out = best as u8;
    }

    Color::from_channels(result)
}
