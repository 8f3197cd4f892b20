//! 4x4 matrix, column-major: identity, from-quaternion, translate,
//! multiply-point, multiply-direction.

use super::{Quat, Vec3};

#[derive(Debug, Clone, Copy)]
pub struct Mat4 {
    pub m: [f32; 16],
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4 {
        m: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub fn translation(t: Vec3) -> Self {
        let mut r = Self::IDENTITY;
        r.m[12] = t.x;
        r.m[13] = t.y;
        r.m[14] = t.z;
        r
    }

    /// Build a rotation matrix from a unit quaternion.
    pub fn from_quat(q: Quat) -> Self {
        let (x, y, z, w) = (q.x, q.y, q.z, q.w);
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);

        Mat4 {
            m: [
                1.0 - (yy + zz), xy + wz, xz - wy, 0.0, //
                xy - wz, 1.0 - (xx + zz), yz + wx, 0.0, //
                xz + wy, yz - wx, 1.0 - (xx + yy), 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    pub fn from_quat_translation(q: Quat, t: Vec3) -> Self {
        let mut r = Self::from_quat(q);
        r.m[12] = t.x;
        r.m[13] = t.y;
        r.m[14] = t.z;
        r
    }

    pub fn mul(&self, b: &Mat4) -> Mat4 {
        let mut r = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                r[col * 4 + row] = self.m[row] * b.m[col * 4]
                    + self.m[4 + row] * b.m[col * 4 + 1]
                    + self.m[8 + row] * b.m[col * 4 + 2]
                    + self.m[12 + row] * b.m[col * 4 + 3];
            }
        }
        Mat4 { m: r }
    }

    /// Transform a point (applies translation).
    pub fn multiply_point(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.m[0] * v.x + self.m[4] * v.y + self.m[8] * v.z + self.m[12],
            self.m[1] * v.x + self.m[5] * v.y + self.m[9] * v.z + self.m[13],
            self.m[2] * v.x + self.m[6] * v.y + self.m[10] * v.z + self.m[14],
        )
    }

    /// Transform a direction (ignores translation).
    pub fn multiply_direction(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.m[0] * v.x + self.m[4] * v.y + self.m[8] * v.z,
            self.m[1] * v.x + self.m[5] * v.y + self.m[9] * v.z,
            self.m[2] * v.x + self.m[6] * v.y + self.m[10] * v.z,
        )
    }
}
