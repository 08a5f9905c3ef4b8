//! Pure-math functions supporting physics calculations.
use core::ops::Sub;

/// Number of evaluation points processed together by the surface-integral kernels.
///
/// Four doubles fill one AVX2 register; the kernels are written as plain loops
/// over lanes so the compiler is free to pick the actual vector width.
pub const LANES: usize = 4;

/// 3D $(x^2 + y^2 + z^2)^{1/2}$ using `mul_add` to perform all addition in extended registers.
#[inline]
pub fn rss3(x: f64, y: f64, z: f64) -> f64 {
    x.mul_add(x, y.mul_add(y, z.powi(2))).sqrt()
}

/// Evaluate the cross products for each axis component
/// separately using `mul_add` which would not be assumed usable
/// in a more general implementation.
#[inline]
pub fn cross3(x0: f64, y0: f64, z0: f64, x1: f64, y1: f64, z1: f64) -> (f64, f64, f64) {
    let xy = -x1 * y0;
    let yz = -y1 * z0;
    let zx = -z1 * x0;
    let cx = y0.mul_add(z1, yz);
    let cy = z0.mul_add(x1, zx);
    let cz = x0.mul_add(y1, xy);

    (cx, cy, cz)
}

/// Scalar dot product using `mul_add`.
#[inline]
pub fn dot3(x0: f64, y0: f64, z0: f64, x1: f64, y1: f64, z1: f64) -> f64 {
    x0.mul_add(x1, y0.mul_add(y1, z0 * z1))
}

/// Lane-wise reciprocal square root, $x^{-1/2}$.
///
/// A zero lane produces `inf`; callers must keep evaluation points off the source points.
#[inline]
pub fn rsqrt(x: [f64; LANES]) -> [f64; LANES] {
    x.map(|v| 1.0 / v.sqrt())
}

/// `LANES` independent 3-vectors stored component-major, so that each
/// component is a contiguous run of doubles.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3Lanes {
    pub x: [f64; LANES],
    pub y: [f64; LANES],
    pub z: [f64; LANES],
}

impl Vec3Lanes {
    /// Broadcast one vector to every lane.
    #[inline]
    pub fn splat(v: (f64, f64, f64)) -> Self {
        Self {
            x: [v.0; LANES],
            y: [v.1; LANES],
            z: [v.2; LANES],
        }
    }

    /// Load up to `LANES` vectors from a flat `[x0, y0, z0, x1, ...]` slice.
    ///
    /// Missing trailing lanes repeat the last vector, which keeps them
    /// finite wherever the loaded ones are.
    #[inline]
    pub fn load(xyz: &[f64]) -> Self {
        let nvec = xyz.len() / 3;
        let mut out = Self::default();
        if nvec == 0 {
            return out;
        }
        for k in 0..LANES {
            let i = 3 * k.min(nvec - 1);
            out.x[k] = xyz[i];
            out.y[k] = xyz[i + 1];
            out.z[k] = xyz[i + 2];
        }
        out
    }

    /// Lane-wise cross product `self x other`.
    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        let mut out = Self::default();
        for k in 0..LANES {
            let (cx, cy, cz) = cross3(
                self.x[k], self.y[k], self.z[k], other.x[k], other.y[k], other.z[k],
            );
            out.x[k] = cx;
            out.y[k] = cy;
            out.z[k] = cz;
        }
        out
    }

    /// Lane-wise squared norm.
    #[inline]
    pub fn normsq(&self) -> [f64; LANES] {
        let mut out = [0.0; LANES];
        for k in 0..LANES {
            out[k] = dot3(self.x[k], self.y[k], self.z[k], self.x[k], self.y[k], self.z[k]);
        }
        out
    }
}

impl Sub for Vec3Lanes {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        let mut out = Self::default();
        for k in 0..LANES {
            out.x[k] = self.x[k] - rhs.x[k];
            out.y[k] = self.y[k] - rhs.y[k];
            out.z[k] = self.z[k] - rhs.z[k];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cross3_right_handed() {
        assert_eq!(cross3(1.0, 0.0, 0.0, 0.0, 1.0, 0.0), (0.0, 0.0, 1.0));
        assert_eq!(cross3(0.0, 1.0, 0.0, 0.0, 0.0, 1.0), (1.0, 0.0, 0.0));
        assert_eq!(cross3(0.0, 0.0, 1.0, 1.0, 0.0, 0.0), (0.0, 1.0, 0.0));
    }

    #[test]
    fn test_lanes_match_scalar() {
        let a = Vec3Lanes::load(&[1.0, 2.0, 3.0, -1.0, 0.5, 4.0, 0.0, 0.0, 2.0, 7.0, -3.0, 1.0]);
        let b = Vec3Lanes::splat((0.25, -1.5, 2.0));

        let d = a - b;
        let c = a.cross(&b);
        let n2 = d.normsq();
        let rinv = rsqrt(n2);

        for k in 0..LANES {
            assert_eq!(d.x[k], a.x[k] - 0.25);
            let (cx, cy, cz) = cross3(a.x[k], a.y[k], a.z[k], 0.25, -1.5, 2.0);
            assert_eq!((c.x[k], c.y[k], c.z[k]), (cx, cy, cz));
            assert_relative_eq!(rinv[k], 1.0 / rss3(d.x[k], d.y[k], d.z[k]), epsilon = 1e-15);
        }
    }

    #[test]
    fn test_load_pads_with_last_vector() {
        let a = Vec3Lanes::load(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(a.x, [1.0, 4.0, 4.0, 4.0]);
        assert_eq!(a.z, [3.0, 6.0, 6.0, 6.0]);
    }

    #[test]
    fn test_rsqrt_zero_is_infinite() {
        let r = rsqrt([0.0, 4.0, 1.0, 0.25]);
        assert!(r[0].is_infinite());
        assert_eq!(&r[1..], &[0.5, 1.0, 2.0]);
    }
}
