//! Quadrature grids for analytic winding and plasma surfaces.
use core::f64::consts::PI;

use nalgebra::geometry::Rotation3;
use nalgebra::Vector3;
use ndarray::Array2;

use crate::error::{WindingSurfaceError, WsResult};

/// Quadrature arrays of a surface sampled on a tensor grid of normalized
/// coordinates `(phi, theta)`, flattened phi-major to shape `(nphi * ntheta, 3)`.
#[derive(Debug, Clone)]
pub struct SurfaceQuadrature {
    /// (m) position
    pub gamma: Array2<f64>,
    /// (m) derivative of position w.r.t. normalized toroidal coordinate
    pub gammadash1: Array2<f64>,
    /// (m) derivative of position w.r.t. normalized poloidal coordinate
    pub gammadash2: Array2<f64>,
    /// (m^2) `gammadash1 x gammadash2`, not normalized
    pub normal: Array2<f64>,
}

/// Circular-cross-section torus about the z axis.
///
/// # Arguments
///
/// * `major_radius`:     (m) distance from the z axis to the center of the tube
/// * `minor_radius`:     (m) tube radius
/// * `quadpoints_phi`:   normalized toroidal coordinates, one turn per unit
/// * `quadpoints_theta`: normalized poloidal coordinates, one turn per unit
///
/// # Commentary
///
/// The cross-section `(R0 + r cos(theta), 0, r sin(theta))` is built in the
/// x-z plane and rotated about z by `2 pi phi`. With this orientation the
/// normal points out of the tube, and its magnitude times `1 / (nphi * ntheta)`
/// is the area of the quadrature cell for a uniform full-turn grid.
pub fn torus_surface(
    major_radius: f64,
    minor_radius: f64,
    quadpoints_phi: &[f64],
    quadpoints_theta: &[f64],
) -> WsResult<SurfaceQuadrature> {
    if !(minor_radius > 0.0 && major_radius > minor_radius) {
        return Err(WindingSurfaceError::Config(format!(
            "torus needs 0 < minor radius < major radius, got {minor_radius}, {major_radius}"
        )));
    }

    let n = quadpoints_phi.len() * quadpoints_theta.len();
    let mut gamma = Array2::zeros((n, 3));
    let mut gammadash1 = Array2::zeros((n, 3));
    let mut gammadash2 = Array2::zeros((n, 3));
    let mut normal = Array2::zeros((n, 3));

    let mut row = 0;
    for &qphi in quadpoints_phi {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 2.0 * PI * qphi);
        for &qtheta in quadpoints_theta {
            let (s, c) = (2.0 * PI * qtheta).sin_cos();
            let rho = minor_radius.mul_add(c, major_radius); // [m] distance from z axis

            let x = rotation * Vector3::new(rho, 0.0, minor_radius * s);
            let d1 = rotation * Vector3::new(0.0, 2.0 * PI * rho, 0.0);
            let d2 = rotation
                * Vector3::new(
                    -2.0 * PI * minor_radius * s,
                    0.0,
                    2.0 * PI * minor_radius * c,
                );
            let nrm = d1.cross(&d2);

            for (arr, v) in [
                (&mut gamma, x),
                (&mut gammadash1, d1),
                (&mut gammadash2, d2),
                (&mut normal, nrm),
            ] {
                arr[[row, 0]] = v.x;
                arr[[row, 1]] = v.y;
                arr[[row, 2]] = v.z;
            }
            row += 1;
        }
    }

    Ok(SurfaceQuadrature {
        gamma,
        gammadash1,
        gammadash2,
        normal,
    })
}

/// `n` points uniformly spaced on `[0, 1)`.
pub fn uniform_quadpoints(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 / n as f64).collect()
}
