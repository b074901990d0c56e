// Shared error taxonomy and Garmin coordinate conversions used by every
// crate in this workspace. Garmin IMG files encode longitude/latitude as
// signed 24-bit fractional degrees, where 2^24 represents a full 360
// degree circle; `garmin_deg`/`garmin_rad` convert from that encoding.

use std::f64::consts::PI;
use thiserror::Error;

/// One full turn in Garmin's 24-bit fixed point coordinate encoding.
pub const GARMIN_UNIT_CIRCLE: f64 = 16_777_216.0; // 2^24

/// `GARMIN_DEG(x) = x * 360 / 2^24`
pub fn garmin_deg(x: i32) -> f64 {
    f64::from(x) * 360.0 / GARMIN_UNIT_CIRCLE
}

/// `GARMIN_RAD(x) = GARMIN_DEG(x) * pi / 180`
pub fn garmin_rad(x: i32) -> f64 {
    garmin_deg(x) * PI / 180.0
}

/// Inverse of `garmin_rad`, rounding to the nearest representable Garmin
/// unit. Used only by tests to check the round trip law from spec.md §8.
pub fn rad_to_garmin(rad: f64) -> i32 {
    let deg = rad * 180.0 / PI;
    (deg * GARMIN_UNIT_CIRCLE / 360.0).round() as i32
}

#[derive(Debug, Error)]
pub enum ImgError {
    #[error("file is encrypted or locked")]
    Locked,

    #[error("bad magic/signature: {0}")]
    BadMagic(String),

    #[error("truncated read: {0}")]
    Truncated(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("operation cancelled by caller")]
    UserCancelled,

    #[error("out of memory, partial result may still be usable")]
    OutOfMemory,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ImgError>;

/// A geographic rectangle in radians. `east < west` after construction
/// means the rect straddles the antimeridian; callers normalize via
/// `Rect::normalized`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Rect {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    pub const fn full_world() -> Self {
        Self {
            north: PI / 2.0,
            south: -PI / 2.0,
            east: PI,
            west: -PI,
        }
    }

    /// Normalizes the degenerate `east == west` case: the bounding box
    /// was stored with both edges equal because the subdivision
    /// straddles the antimeridian. Flipping east's sign
    /// recovers a (still degenerate, but directionally useful) rect
    /// instead of failing outright.
    pub fn normalized(mut self) -> Self {
        if (self.east - self.west).abs() < f64::EPSILON {
            self.east = -self.east;
        }
        self
    }

    fn wraps(&self) -> bool {
        self.east < self.west
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        if self.north < other.south || self.south > other.north {
            return false;
        }
        let lon_overlap = |a: &Rect, b: &Rect| -> bool {
            if !a.wraps() && !b.wraps() {
                a.west <= b.east && b.west <= a.east
            } else {
                // Either rect straddles the antimeridian: split into two
                // non-wrapping spans and test both against the other rect.
                let a_spans: &[(f64, f64)] = if a.wraps() {
                    &[(a.west, PI), (-PI, a.east)]
                } else {
                    &[(a.west, a.east)]
                };
                let b_spans: &[(f64, f64)] = if b.wraps() {
                    &[(b.west, PI), (-PI, b.east)]
                } else {
                    &[(b.west, b.east)]
                };
                a_spans.iter().any(|(aw, ae)| {
                    b_spans
                        .iter()
                        .any(|(bw, be)| *aw <= *be && *bw <= *ae)
                })
            }
        };
        lon_overlap(self, other)
    }

    pub fn merge(&self, other: &Rect) -> Rect {
        Rect {
            north: self.north.max(other.north),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            west: self.west.min(other.west),
        }
    }

    pub fn contains_point(&self, lng: f64, lat: f64) -> bool {
        if lat > self.north || lat < self.south {
            return false;
        }
        if !self.wraps() {
            lng >= self.west && lng <= self.east
        } else {
            lng >= self.west || lng <= self.east
        }
    }
}
