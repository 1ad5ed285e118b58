//! Chunk-space and world-space integer coordinates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies a chunk's position in the chunk grid.
///
/// A chunk at `(cx, cy, cz)` covers world voxels
/// `[c * size, (c + 1) * size)` on each axis. The coordinate itself is the
/// key used by every scheduler table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// Chunk-grid X coordinate.
    pub cx: i32,
    /// Chunk-grid Y coordinate.
    pub cy: i32,
    /// Chunk-grid Z coordinate.
    pub cz: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    pub const fn new(cx: i32, cy: i32, cz: i32) -> Self {
        Self { cx, cy, cz }
    }

    /// Returns the coordinate of the chunk offset by `(dx, dy, dz)`.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            cx: self.cx + dx,
            cy: self.cy + dy,
            cz: self.cz + dz,
        }
    }

    /// World-space position of the chunk's minimum corner.
    pub fn origin(self, size: usize) -> WorldOrigin {
        let s = size as i32;
        WorldOrigin {
            x: self.cx * s,
            y: self.cy * s,
            z: self.cz * s,
        }
    }

    /// The chunk containing world voxel `(x, y, z)`.
    pub fn containing(x: i32, y: i32, z: i32, size: usize) -> Self {
        let s = size as i32;
        Self {
            cx: x.div_euclid(s),
            cy: y.div_euclid(s),
            cz: z.div_euclid(s),
        }
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.cx, self.cy, self.cz)
    }
}

/// Error returned when parsing a `"cx,cy,cz"` chunk key fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid chunk key `{0}`, expected `cx,cy,cz`")]
pub struct ParseChunkCoordError(pub String);

impl FromStr for ChunkCoord {
    type Err = ParseChunkCoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseChunkCoordError(s.to_string());
        let mut parts = s.split(',').map(|p| p.trim().parse::<i32>());
        let cx = parts.next().ok_or_else(err)?.map_err(|_| err())?;
        let cy = parts.next().ok_or_else(err)?.map_err(|_| err())?;
        let cz = parts.next().ok_or_else(err)?.map_err(|_| err())?;
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self { cx, cy, cz })
    }
}

/// Integer world-space voxel position (a chunk's minimum corner).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldOrigin {
    /// World X.
    pub x: i32,
    /// World Y.
    pub y: i32,
    /// World Z.
    pub z: i32,
}

impl WorldOrigin {
    /// Creates a new world origin.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_scales_by_chunk_size() {
        let coord = ChunkCoord::new(1, -2, 3);
        assert_eq!(coord.origin(16), WorldOrigin::new(16, -32, 48));
    }

    #[test]
    fn test_containing_floors_negative_coordinates() {
        assert_eq!(ChunkCoord::containing(-1, 0, 15, 16), ChunkCoord::new(-1, 0, 0));
        assert_eq!(ChunkCoord::containing(-16, -17, 16, 16), ChunkCoord::new(-1, -2, 1));
    }

    #[test]
    fn test_key_display_and_parse() {
        let coord = ChunkCoord::new(-4, 0, 12);
        let key = coord.to_string();
        assert_eq!(key, "-4,0,12");
        assert_eq!(key.parse::<ChunkCoord>(), Ok(coord));
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert!("1,2".parse::<ChunkCoord>().is_err());
        assert!("1,2,3,4".parse::<ChunkCoord>().is_err());
        assert!("a,b,c".parse::<ChunkCoord>().is_err());
    }
}
