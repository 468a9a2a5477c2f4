//! RGB colors and their conversion to the bridge's xy chromaticity space.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// An RGB color with red, green, and blue components (0-255 each).
///
/// Timeline cues author colors as `#RRGGBB` strings; parse them with
/// [`FromStr`]:
///
/// ```
/// use std::str::FromStr;
/// use hue_timeline_rs::Color;
///
/// let color = Color::from_str("#FF8000").unwrap();
/// assert_eq!((color.red(), color.green(), color.blue()), (255, 128, 0));
/// ```
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub(crate) red: u8,
    pub(crate) green: u8,
    pub(crate) blue: u8,
}

impl Color {
    /// Create a color with the given RGB values.
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Create a default color (black: 0,0,0).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    /// Map this color into the bridge's chromaticity coordinates.
    pub fn to_xy(&self) -> Xy {
        Xy::from(self)
    }

    /// Format as `#RRGGBB`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

impl FromStr for Color {
    type Err = Error;

    /// Parse from a hex string, with or without the leading `#` (e.g., "#FF8000").
    fn from_str(s: &str) -> Result<Self, Error> {
        let hex = s.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidColorString(s.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| Error::InvalidColorString(s.to_string()))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// A point in CIE xy chromaticity space, both coordinates in `[0, 1]`.
///
/// Chromaticity carries hue and saturation only; brightness is sent
/// separately.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl Xy {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns true if either coordinate differs from `other` by more than
    /// `tolerance`.
    pub fn differs_from(&self, other: &Xy, tolerance: f64) -> bool {
        (self.x - other.x).abs() > tolerance || (self.y - other.y).abs() > tolerance
    }
}

impl From<[f64; 2]> for Xy {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Xy> for [f64; 2] {
    fn from(xy: Xy) -> Self {
        [xy.x, xy.y]
    }
}

impl From<&Color> for Xy {
    /// sRGB gamma expansion followed by the bridge's wide-gamut RGB to XYZ
    /// matrix, projected onto the xy plane. Zero luminance maps to `(0, 0)`.
    fn from(color: &Color) -> Self {
        let red = linearize(color.red);
        let green = linearize(color.green);
        let blue = linearize(color.blue);

        let x = red * 0.664511 + green * 0.154324 + blue * 0.162028;
        let y = red * 0.283881 + green * 0.729298 + blue * 0.027045;
        let z = red * 0.000088 + green * 0.083861 + blue * 0.088009;

        let sum = x + y + z;
        if sum == 0.0 {
            return Xy::default();
        }
        Xy::new(x / sum, y / sum)
    }
}

fn linearize(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}
