//! Per-frame inputs handed to the archive by the pipeline

use crate::core::raster::ImageView;
use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};

/// Capture time plus frame number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds, fractional
    pub time: f64,
    /// Frame number within the stream
    pub frame: i64,
}

impl Timestamp {
    pub fn new(time: f64, frame: i64) -> Self {
        Timestamp { time, frame }
    }

    /// Time in whole microseconds, rounded to nearest
    pub fn micros(&self) -> Result<i64> {
        if !self.time.is_finite() {
            return Err(ArchiveError::InvalidRecord(format!(
                "timestamp {} of frame {} is not finite",
                self.time, self.frame
            )));
        }
        whole_micros(self.time * 1_000_000.0).ok_or_else(|| {
            ArchiveError::InvalidRecord(format!(
                "timestamp {} s does not fit in 64-bit microseconds",
                self.time
            ))
        })
    }
}

/// Round to the nearest integer, `None` outside the i64 range.
/// `i64::MAX as f64` is 2^63, one past the largest i64.
fn whole_micros(us: f64) -> Option<i64> {
    let us = us.round();
    if us < i64::MIN as f64 || us >= i64::MAX as f64 {
        return None;
    }
    Some(us as i64)
}

/// Longitude/latitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        GeoPoint {
            longitude,
            latitude,
        }
    }

    pub fn to_pair(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Image footprint on the ground: upper-left, upper-right, lower-right,
/// lower-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    corners: [GeoPoint; 4],
}

impl GeoPolygon {
    pub fn new(
        upper_left: GeoPoint,
        upper_right: GeoPoint,
        lower_right: GeoPoint,
        lower_left: GeoPoint,
    ) -> Self {
        GeoPolygon {
            corners: [upper_left, upper_right, lower_right, lower_left],
        }
    }

    /// Build from points already in UL, UR, LR, LL order
    pub fn from_points(points: &[GeoPoint]) -> Result<Self> {
        let corners: [GeoPoint; 4] = points.try_into().map_err(|_| {
            ArchiveError::InvalidRecord(format!(
                "corner polygon needs exactly 4 points, got {}",
                points.len()
            ))
        })?;
        Ok(GeoPolygon { corners })
    }

    pub fn corners(&self) -> &[GeoPoint; 4] {
        &self.corners
    }

    pub fn upper_left(&self) -> GeoPoint {
        self.corners[0]
    }

    pub fn upper_right(&self) -> GeoPoint {
        self.corners[1]
    }

    pub fn lower_right(&self) -> GeoPoint {
        self.corners[2]
    }

    pub fn lower_left(&self) -> GeoPoint {
        self.corners[3]
    }

    /// Corners as `[lon, lat]` pairs in stored order
    pub fn to_pairs(&self) -> [[f64; 2]; 4] {
        self.corners.map(GeoPoint::to_pair)
    }
}

/// Frame-to-frame homography
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    /// Row-major 3x3 transform
    pub matrix: [[f64; 3]; 3],
    /// Frame the transform maps from
    pub from_id: i64,
    /// Reference frame the transform maps into
    pub to_id: i64,
}

impl Homography {
    pub fn new(matrix: [[f64; 3]; 3], from_id: i64, to_id: i64) -> Self {
        Homography {
            matrix,
            from_id,
            to_id,
        }
    }

    /// Identity mapping of frame `id` onto itself
    pub fn identity(id: i64) -> Self {
        Homography {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            from_id: id,
            to_id: id,
        }
    }
}

/// Everything archived for one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameRecord<'a> {
    pub timestamp: Timestamp,
    pub image: ImageView<'a>,
    pub homography: Homography,
    pub corners: GeoPolygon,
    /// Ground sample distance
    pub gsd: f64,
}
