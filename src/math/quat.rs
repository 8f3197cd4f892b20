//! Unit quaternion: identity, axis-angle construction, multiply, vector
//! rotation, normalize. Orientation integration renormalizes every step so
//! unit-norm drift stays bounded regardless of how many steps accumulate.

use super::Vec3;

#[derive(Debug, Clone, Copy)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize();
        let half = angle * 0.5;
        let s = half.sin();
        Quat::new(axis.x * s, axis.y * s, axis.z * s, half.cos())
    }

    #[inline]
    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    /// Normalize; falls back to identity when the magnitude has collapsed,
    /// rather than propagating NaN.
    pub fn normalize(self) -> Quat {
        let l = self.length();
        if l < 1e-8 {
            Quat::IDENTITY
        } else {
            let inv = 1.0 / l;
            Quat::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
        }
    }

    /// Hamilton product `self * o`.
    pub fn mul(self, o: Quat) -> Quat {
        Quat::new(
            self.w * o.x + self.x * o.w + self.y * o.z - self.z * o.y,
            self.w * o.y - self.x * o.z + self.y * o.w + self.z * o.x,
            self.w * o.z + self.x * o.y - self.y * o.x + self.z * o.w,
            self.w * o.w - self.x * o.x - self.y * o.y - self.z * o.z,
        )
    }

    pub fn conjugate(self) -> Quat {
        Quat::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotate a vector by this (assumed-unit) quaternion.
    pub fn rotate_vector(self, v: Vec3) -> Vec3 {
        let qv = Vec3::new(self.x, self.y, self.z);
        let t = qv.cross(v).scale(2.0);
        v.add(t.scale(self.w)).add(qv.cross(t))
    }

    /// Integrate angular velocity `omega` over `dt` and return the
    /// renormalized result: `q <- normalize(q * dq(omega, dt))`.
    pub fn integrate(self, omega: Vec3, dt: f32) -> Quat {
        // dq = (1, omega*dt/2) unnormalized small-angle approximation,
        // renormalized immediately after.
        let half = omega.scale(dt * 0.5);
        let dq = Quat::new(half.x, half.y, half.z, 1.0);
        self.mul(dq).normalize()
    }

    pub fn unit_norm_error(self) -> f32 {
        (self.length() - 1.0).abs()
    }
}
