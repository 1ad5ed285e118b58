//! The six axis-aligned directions a quad can face.

/// One of the six cardinal directions a voxel face can point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaceDirection {
    /// +X direction.
    PosX = 0,
    /// −X direction.
    NegX = 1,
    /// +Y direction.
    PosY = 2,
    /// −Y direction.
    NegY = 3,
    /// +Z direction.
    PosZ = 4,
    /// −Z direction.
    NegZ = 5,
}

impl FaceDirection {
    /// All six directions in order.
    pub const ALL: [FaceDirection; 6] = [
        Self::PosX,
        Self::NegX,
        Self::PosY,
        Self::NegY,
        Self::PosZ,
        Self::NegZ,
    ];

    /// Direction along `axis` (0=X, 1=Y, 2=Z) with the sign of a mask value.
    pub fn from_axis_sign(axis: usize, positive: bool) -> Self {
        match (axis, positive) {
            (0, true) => Self::PosX,
            (0, false) => Self::NegX,
            (1, true) => Self::PosY,
            (1, false) => Self::NegY,
            (_, true) => Self::PosZ,
            (_, false) => Self::NegZ,
        }
    }

    /// Axis perpendicular to the face (0=X, 1=Y, 2=Z).
    pub fn axis(self) -> usize {
        (self as usize) / 2
    }

    /// Whether the normal points along the positive axis.
    pub fn is_positive(self) -> bool {
        (self as usize) % 2 == 0
    }

    /// Returns the unit normal as `[f32; 3]` for this face direction.
    pub fn normal(self) -> [f32; 3] {
        match self {
            Self::PosX => [1.0, 0.0, 0.0],
            Self::NegX => [-1.0, 0.0, 0.0],
            Self::PosY => [0.0, 1.0, 0.0],
            Self::NegY => [0.0, -1.0, 0.0],
            Self::PosZ => [0.0, 0.0, 1.0],
            Self::NegZ => [0.0, 0.0, -1.0],
        }
    }
}
