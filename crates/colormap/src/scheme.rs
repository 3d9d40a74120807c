//! Color schemes and multi-stop interpolation engine.

use serde::{Deserialize, Serialize};

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Fully opaque RGBA version of this color.
    pub const fn opaque(self) -> Rgba {
        Rgba::new(self.r, self.g, self.b, 255)
    }
}

/// RGBA color; alpha 0 is fully transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Flat color for pixels inside the change-range filter.
    pub const HIGHLIGHT: Self = Self::new(255, 0, 0, 255);
    /// Pixels whose difference falls outside the change-range filter.
    pub const OUT_OF_CHANGE: Self = Self::new(0, 0, 0, 255);
    /// Pixels whose composite fell outside the accepted composite range.
    pub const OUT_OF_COMPOSITE: Self = Self::new(255, 255, 255, 255);
    /// No-data pixels.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Available color schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    /// Red -> Yellow -> Green, losses red and gains green
    #[default]
    RdYlGn,
    /// Blue -> White -> Red
    BlueWhiteRed,
    /// Brown -> Yellow -> Green
    Ndvi,
    /// Black -> White
    Grayscale,
}

impl ColorScheme {
    pub const ALL: &[ColorScheme] = &[
        Self::RdYlGn,
        Self::BlueWhiteRed,
        Self::Ndvi,
        Self::Grayscale,
    ];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RdYlGn => "Red-Yellow-Green",
            Self::BlueWhiteRed => "Blue-White-Red",
            Self::Ndvi => "NDVI",
            Self::Grayscale => "Grayscale",
        }
    }
}

// ─── Color stop definitions ────────────────────────────────────────────

const RD_YL_GN_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 165, 0, 38),
    ColorStop::new(0.1, 215, 48, 39),
    ColorStop::new(0.2, 244, 109, 67),
    ColorStop::new(0.3, 253, 174, 97),
    ColorStop::new(0.4, 254, 224, 139),
    ColorStop::new(0.5, 255, 255, 191),
    ColorStop::new(0.6, 217, 239, 139),
    ColorStop::new(0.7, 166, 217, 106),
    ColorStop::new(0.8, 102, 189, 99),
    ColorStop::new(0.9, 26, 152, 80),
    ColorStop::new(1.0, 0, 104, 55),
];

const BLUE_WHITE_RED_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 33, 102, 172),
    ColorStop::new(0.25, 103, 169, 207),
    ColorStop::new(0.50, 247, 247, 247),
    ColorStop::new(0.75, 239, 138, 98),
    ColorStop::new(1.00, 178, 24, 43),
];

const NDVI_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 120, 70, 20),
    ColorStop::new(0.3, 200, 170, 60),
    ColorStop::new(0.5, 240, 230, 100),
    ColorStop::new(0.7, 100, 180, 50),
    ColorStop::new(1.0, 10, 100, 20),
];

// ─── Interpolation engine ──────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    let first = stops[0].color;
    let last = stops[stops.len() - 1].color;
    if t <= 0.0 {
        return first;
    }
    if t >= 1.0 {
        return last;
    }
    for pair in stops.windows(2) {
        if t <= pair[1].t {
            let ratio = (t - pair[0].t) / (pair[1].t - pair[0].t);
            return lerp_color(pair[0].color, pair[1].color, ratio);
        }
    }
    last
}

/// Evaluate a color scheme at normalized position `t`.
///
/// Positions outside [0, 1] saturate at the end stops.
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    match scheme {
        ColorScheme::RdYlGn => multi_stop(RD_YL_GN_STOPS, t),
        ColorScheme::BlueWhiteRed => multi_stop(BLUE_WHITE_RED_STOPS, t),
        ColorScheme::Ndvi => multi_stop(NDVI_STOPS, t),
        ColorScheme::Grayscale => {
            let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
    }
}
