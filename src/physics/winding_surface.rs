//! Magnetic field, vector potential, and their gradients from a surface current
//! sheet discretized on winding-surface quadrature points.
//!
//! All four evaluators share the same structure: validate the inputs, split the
//! evaluation points into one chunk per core, and within each chunk sweep
//! `LANES` evaluation points at a time over every source point.
use std::num::NonZeroUsize;

use log::debug;
use ndarray::{Array2, Array3, ArrayView2};
use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::{ParallelSlice, ParallelSliceMut},
};

use crate::error::WsResult;
use crate::layout::xyz_slice;
use crate::math::{dot3, rsqrt, Vec3Lanes, LANES};
use crate::MU0_OVER_4PI;

/// Quadrature data of the current sheet, with the area weight `|n|` already
/// folded into the current density.
struct SurfaceSources<'a> {
    xyz: &'a [f64],
    /// |n_j| K_j, flat, same length as `xyz`
    weighted_current: Vec<f64>,
}

impl<'a> SurfaceSources<'a> {
    fn new(
        ws_points: ArrayView2<'a, f64>,
        ws_normal: ArrayView2<'_, f64>,
        k: ArrayView2<'_, f64>,
    ) -> WsResult<Self> {
        let xyz = xyz_slice("winding surface points", ws_points, None)?;
        let m = xyz.len() / 3;
        let normal = xyz_slice("winding surface normal", ws_normal, Some(m))?;
        let k = xyz_slice("surface current", k, Some(m))?;

        let weighted_current = normal
            .chunks_exact(3)
            .zip(k.chunks_exact(3))
            .flat_map(|(n, k)| {
                let nmag = dot3(n[0], n[1], n[2], n[0], n[1], n[2]).sqrt();
                [nmag * k[0], nmag * k[1], nmag * k[2]]
            })
            .collect();

        Ok(Self {
            xyz,
            weighted_current,
        })
    }

    fn len(&self) -> usize {
        self.xyz.len() / 3
    }

    #[inline(always)]
    fn get(&self, j: usize) -> ((f64, f64, f64), (f64, f64, f64)) {
        let s = &self.xyz[3 * j..3 * j + 3];
        let w = &self.weighted_current[3 * j..3 * j + 3];
        ((s[0], s[1], s[2]), (w[0], w[1], w[2]))
    }
}

/// Per-lane accumulator for `NOUT` output components.
type Acc<const NOUT: usize> = [[f64; LANES]; NOUT];

/// Sweep a chunk of evaluation points over all sources.
///
/// `kernel` adds one source's contribution to the accumulator of a batch of
/// lanes. Output for point `i` component `c` lands at `out[NOUT * i + c]`.
fn evaluate_chunk<const NOUT: usize, F>(
    points: &[f64],
    sources: &SurfaceSources,
    out: &mut [f64],
    kernel: F,
) where
    F: Fn(&Vec3Lanes, (f64, f64, f64), (f64, f64, f64), &mut Acc<NOUT>),
{
    let nsrc = sources.len();
    for (pb, ob) in points
        .chunks(3 * LANES)
        .zip(out.chunks_mut(NOUT * LANES))
    {
        let nlanes = pb.len() / 3;
        let p = Vec3Lanes::load(pb);
        let mut acc: Acc<NOUT> = [[0.0; LANES]; NOUT];

        // Surface integral over the winding surface
        for j in 0..nsrc {
            let (s, w) = sources.get(j);
            kernel(&p, s, w, &mut acc);
        }

        for k in 0..nlanes {
            for c in 0..NOUT {
                ob[NOUT * k + c] = MU0_OVER_4PI * acc[c][k];
            }
        }
    }
}

/// Validate inputs, then run `kernel` over chunks of evaluation points in parallel.
fn evaluate_par<const NOUT: usize, F>(
    what: &str,
    points: ArrayView2<'_, f64>,
    ws_points: ArrayView2<'_, f64>,
    ws_normal: ArrayView2<'_, f64>,
    k: ArrayView2<'_, f64>,
    kernel: F,
) -> WsResult<(usize, Vec<f64>)>
where
    F: Fn(&Vec3Lanes, (f64, f64, f64), (f64, f64, f64), &mut Acc<NOUT>) + Copy + Sync,
{
    let xyzp = xyz_slice("points", points, None)?;
    let sources = SurfaceSources::new(ws_points, ws_normal, k)?;
    let npoints = xyzp.len() / 3;

    debug!(
        "winding surface {what}: {npoints} evaluation points, {} sources",
        sources.len()
    );

    // Chunk inputs, one chunk per core, each a whole number of lane batches
    let ncores = std::thread::available_parallelism()
        .unwrap_or(NonZeroUsize::MIN)
        .get();
    let n = (npoints / ncores).max(1).div_ceil(LANES) * LANES;

    let mut out = vec![0.0; NOUT * npoints];
    xyzp.par_chunks(3 * n)
        .zip(out.par_chunks_mut(NOUT * n))
        .for_each(|(p, o)| evaluate_chunk::<NOUT, F>(p, &sources, o, kernel));

    Ok((npoints, out))
}

#[inline(always)]
fn b_kernel(p: &Vec3Lanes, s: (f64, f64, f64), w: (f64, f64, f64), acc: &mut Acc<3>) {
    let r = *p - Vec3Lanes::splat(s);
    let rinv = rsqrt(r.normsq());
    let kxr = Vec3Lanes::splat(w).cross(&r);
    for k in 0..LANES {
        let rinv3 = rinv[k] * rinv[k] * rinv[k];
        acc[0][k] = kxr.x[k].mul_add(rinv3, acc[0][k]);
        acc[1][k] = kxr.y[k].mul_add(rinv3, acc[1][k]);
        acc[2][k] = kxr.z[k].mul_add(rinv3, acc[2][k]);
    }
}

#[inline(always)]
fn db_kernel(p: &Vec3Lanes, s: (f64, f64, f64), w: (f64, f64, f64), acc: &mut Acc<9>) {
    let r = *p - Vec3Lanes::splat(s);
    let rinv = rsqrt(r.normsq());
    let kxr = Vec3Lanes::splat(w).cross(&r);
    let (wx, wy, wz) = w;

    // K x e_d for d = x, y, z
    let kxe = [(0.0, wz, -wy), (-wz, 0.0, wx), (wy, -wx, 0.0)];

    for k in 0..LANES {
        let rinv3 = rinv[k] * rinv[k] * rinv[k];
        let rinv5 = rinv3 * rinv[k] * rinv[k];
        let rd = [r.x[k], r.y[k], r.z[k]];
        let kxr_k = [kxr.x[k], kxr.y[k], kxr.z[k]];
        for d in 0..3 {
            let kxe_d = [kxe[d].0, kxe[d].1, kxe[d].2];
            let f = -3.0 * rinv5 * rd[d];
            for c in 0..3 {
                acc[3 * d + c][k] += kxe_d[c].mul_add(rinv3, f * kxr_k[c]);
            }
        }
    }
}

#[inline(always)]
fn a_kernel(p: &Vec3Lanes, s: (f64, f64, f64), w: (f64, f64, f64), acc: &mut Acc<3>) {
    let r = *p - Vec3Lanes::splat(s);
    let rinv = rsqrt(r.normsq());
    for k in 0..LANES {
        acc[0][k] = w.0.mul_add(rinv[k], acc[0][k]);
        acc[1][k] = w.1.mul_add(rinv[k], acc[1][k]);
        acc[2][k] = w.2.mul_add(rinv[k], acc[2][k]);
    }
}

#[inline(always)]
fn da_kernel(p: &Vec3Lanes, s: (f64, f64, f64), w: (f64, f64, f64), acc: &mut Acc<9>) {
    let r = *p - Vec3Lanes::splat(s);
    let rinv = rsqrt(r.normsq());
    let wc = [w.0, w.1, w.2];
    for k in 0..LANES {
        let rinv3 = rinv[k] * rinv[k] * rinv[k];
        let rd = [r.x[k], r.y[k], r.z[k]];
        for d in 0..3 {
            let f = -rd[d] * rinv3;
            for c in 0..3 {
                acc[3 * d + c][k] = wc[c].mul_add(f, acc[3 * d + c][k]);
            }
        }
    }
}

/// Magnetic flux density from a winding-surface current sheet.
///
/// $B(x) = \frac{\mu_0}{4\pi} \sum_j |n_j| \frac{K_j \times (x - y_j)}{|x - y_j|^3}$
///
/// # Arguments
///
/// * `points`:    (m) Evaluation points, shape `(n, 3)`
/// * `ws_points`: (m) Winding-surface quadrature points, shape `(m, 3)`
/// * `ws_normal`: (m^2) Unnormalized surface normals, shape `(m, 3)`; magnitude is the quadrature weight
/// * `k`:         (A/m) Surface current density at the quadrature points, shape `(m, 3)`
///
/// Returns (T) B at the evaluation points, shape `(n, 3)`.
///
/// # Errors
///
/// Any input that is not `(_, 3)`, row-major and contiguous, or whose row count
/// disagrees with `ws_points`, is rejected before any computation.
///
/// Evaluation points coinciding with a quadrature point are not checked and
/// produce non-finite output.
pub fn flux_density_winding_surface(
    points: ArrayView2<'_, f64>,
    ws_points: ArrayView2<'_, f64>,
    ws_normal: ArrayView2<'_, f64>,
    k: ArrayView2<'_, f64>,
) -> WsResult<Array2<f64>> {
    let (n, out) = evaluate_par::<3, _>("B", points, ws_points, ws_normal, k, b_kernel)?;
    Ok(Array2::from_shape_vec((n, 3), out)?)
}

/// Gradient of the magnetic flux density from a winding-surface current sheet.
///
/// Same arguments as [`flux_density_winding_surface`].
///
/// Returns (T/m) array of shape `(n, 3, 3)` where `[i, d, c]` is $\partial B_c / \partial x_d$
/// at evaluation point `i`.
pub fn flux_density_gradient_winding_surface(
    points: ArrayView2<'_, f64>,
    ws_points: ArrayView2<'_, f64>,
    ws_normal: ArrayView2<'_, f64>,
    k: ArrayView2<'_, f64>,
) -> WsResult<Array3<f64>> {
    let (n, out) = evaluate_par::<9, _>("dB", points, ws_points, ws_normal, k, db_kernel)?;
    Ok(Array3::from_shape_vec((n, 3, 3), out)?)
}

/// Magnetic vector potential from a winding-surface current sheet.
///
/// $A(x) = \frac{\mu_0}{4\pi} \sum_j |n_j| \frac{K_j}{|x - y_j|}$
///
/// Same arguments as [`flux_density_winding_surface`].
///
/// Returns (T-m) A at the evaluation points, shape `(n, 3)`.
pub fn vector_potential_winding_surface(
    points: ArrayView2<'_, f64>,
    ws_points: ArrayView2<'_, f64>,
    ws_normal: ArrayView2<'_, f64>,
    k: ArrayView2<'_, f64>,
) -> WsResult<Array2<f64>> {
    let (n, out) = evaluate_par::<3, _>("A", points, ws_points, ws_normal, k, a_kernel)?;
    Ok(Array2::from_shape_vec((n, 3), out)?)
}

/// Gradient of the magnetic vector potential from a winding-surface current sheet.
///
/// Same arguments as [`flux_density_winding_surface`].
///
/// Returns (T) array of shape `(n, 3, 3)` where `[i, d, c]` is $\partial A_c / \partial x_d$.
pub fn vector_potential_gradient_winding_surface(
    points: ArrayView2<'_, f64>,
    ws_points: ArrayView2<'_, f64>,
    ws_normal: ArrayView2<'_, f64>,
    k: ArrayView2<'_, f64>,
) -> WsResult<Array3<f64>> {
    let (n, out) = evaluate_par::<9, _>("dA", points, ws_points, ws_normal, k, da_kernel)?;
    Ok(Array3::from_shape_vec((n, 3, 3), out)?)
}
