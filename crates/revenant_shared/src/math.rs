//! Spatial types carried by instantiation records.
//!
//! These are the canonical representations used on the wire. Hosts convert
//! them into whatever their scene graph uses.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - world position
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Quaternion for orientation
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Placement - position + orientation.
///
/// Pooled entities are parked at [`Placement::NEUTRAL`] while they sit in a
/// free list.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Placement {
    /// Position
    pub position: Vec3,
    /// Orientation
    pub rotation: Quaternion,
}

impl Placement {
    /// Creates a new placement
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    /// Origin, no rotation
    pub const NEUTRAL: Self = Self::new(Vec3::ZERO, Quaternion::IDENTITY);

    /// Placement at `position` with identity rotation
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self::new(position, Quaternion::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum.to_array(), [5.0, 7.0, 9.0]);
        assert_eq!(b - a, Vec3::from_array([3.0, 3.0, 3.0]));
    }

    #[test]
    fn test_placement_defaults_to_neutral() {
        assert_eq!(Placement::default(), Placement::NEUTRAL);
        assert_eq!(Placement::NEUTRAL.rotation, Quaternion::IDENTITY);
    }

    #[test]
    fn test_placement_bytemuck() {
        let p = Placement::at(Vec3::new(1.0, 2.0, 3.0));
        let bytes: &[u8] = bytemuck::bytes_of(&p);
        assert_eq!(bytes.len(), 28); // 3 + 4 floats
    }
}
