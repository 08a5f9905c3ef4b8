//! Normal-field influence matrices for fitting a winding-surface current
//! potential to a target on the plasma surface (REGCOIL, eq. A10).
use log::debug;
use ndarray::{Array1, Array2, ArrayView2};
use rayon::{
    iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

use crate::error::WsResult;
use crate::layout::{check_len, xyz_slice};
use crate::math::{cross3, dot3, rss3};
use crate::MU0_OVER_4PI;

/// Linear map from current-potential DOFs to normal field on the plasma surface.
#[derive(Debug, Clone)]
pub struct NormalFieldInfluence {
    /// (T) shape `(nplasma, ndofs)`; column `k` is the normal field of DOF `k` at unit amplitude
    pub gj: Array2<f64>,
    /// shape `(ndofs, ndofs)`, `sum_i gj[i, j] gj[i, k] / |n_i|`
    pub ajk: Array2<f64>,
}

/// Assemble the normal-field influence matrix and its Gram matrix.
///
/// # Arguments
///
/// * `points_plasma`: (m) plasma-surface quadrature points, shape `(np, 3)`
/// * `points_coil`:   (m) winding-surface quadrature points, shape `(nc, 3)`
/// * `normal_plasma`: (m^2) unnormalized plasma-surface normals, shape `(np, 3)`
/// * `normal_coil`:   (m^2) unnormalized winding-surface normals, shape `(nc, 3)`
/// * `stellsym`:      stellarator symmetry of the DOF basis
/// * `zeta_coil`:     (rad) toroidal angle of each winding-surface point, length `nc`
/// * `theta_coil`:    (rad) poloidal angle of each winding-surface point, length `nc`
/// * `m`, `n`:        poloidal and toroidal mode number of each DOF, length `ndofs`
///
/// # Commentary
///
/// Proceeds in three stages:
///
/// 1. Dipole-sheet kernel between every plasma and coil point,
///    $g_{ij} = \frac{\mu_0}{4\pi}\left(\frac{n_p \cdot n_c}{r^3} - \frac{3 (r \cdot n_p)(r \cdot n_c)}{r^5}\right)$
///    with $r = x_i - y_j$.
/// 2. Projection on to the Fourier basis,
///    $g_{ik} = \sum_j g_{ij} (\sin\alpha_{jk} + \cos\alpha_{jk})$,
///    $\alpha_{jk} = m_k \theta_j - n_k \zeta_j$.
/// 3. Gram matrix $A_{jk} = \sum_i g_{ij} g_{ik} / |n_{p,i}|$.
///
/// Both normals enter stage 1 unnormalized, so their magnitudes act as the
/// quadrature weights of the two surfaces.
///
/// Stage 2 adds both parities for every DOF whatever the value of `stellsym`,
/// although a symmetric basis would normally keep only the sine part.
/// `stellsym` is accepted so the signature stays stable if that changes.
// TODO: confirm with the coil-design owners whether `stellsym` should drop the cosine term in stage 2
#[allow(clippy::too_many_arguments)]
pub fn winding_surface_field_bn(
    points_plasma: ArrayView2<'_, f64>,
    points_coil: ArrayView2<'_, f64>,
    normal_plasma: ArrayView2<'_, f64>,
    normal_coil: ArrayView2<'_, f64>,
    stellsym: bool,
    zeta_coil: &[f64],
    theta_coil: &[f64],
    m: &[i32],
    n: &[i32],
) -> WsResult<NormalFieldInfluence> {
    let xp = xyz_slice("plasma points", points_plasma, None)?;
    let np = xp.len() / 3;
    let xc = xyz_slice("coil points", points_coil, None)?;
    let nc = xc.len() / 3;
    let nrm_p = xyz_slice("plasma normal", normal_plasma, Some(np))?;
    let nrm_c = xyz_slice("coil normal", normal_coil, Some(nc))?;
    check_len("zeta_coil", zeta_coil, nc)?;
    check_len("theta_coil", theta_coil, nc)?;
    let ndofs = m.len();
    check_len("n", n, ndofs)?;

    debug!(
        "normal field influence: {np} plasma points, {nc} coil points, {ndofs} dofs, stellsym={stellsym}"
    );

    // Stage 1: geometric kernel, one row per plasma point
    let mut gij = vec![0.0; np * nc];
    if nc > 0 {
        gij.par_chunks_mut(nc).enumerate().for_each(|(i, row)| {
            let (px, py, pz) = (xp[3 * i], xp[3 * i + 1], xp[3 * i + 2]);
            let (npx, npy, npz) = (nrm_p[3 * i], nrm_p[3 * i + 1], nrm_p[3 * i + 2]);
            for (j, g) in row.iter_mut().enumerate() {
                let (ncx, ncy, ncz) = (nrm_c[3 * j], nrm_c[3 * j + 1], nrm_c[3 * j + 2]);
                let rx = px - xc[3 * j];
                let ry = py - xc[3 * j + 1];
                let rz = pz - xc[3 * j + 2];

                let rinv = 1.0 / rss3(rx, ry, rz);
                let rinv3 = rinv * rinv * rinv;
                let rinv5 = rinv3 * rinv * rinv;

                let npdotnc = dot3(npx, npy, npz, ncx, ncy, ncz);
                let rdotnp = dot3(rx, ry, rz, npx, npy, npz);
                let rdotnc = dot3(rx, ry, rz, ncx, ncy, ncz);

                *g = MU0_OVER_4PI * npdotnc.mul_add(rinv3, -3.0 * rdotnp * rdotnc * rinv5);
            }
        });
    }

    // Stage 2: basis functions do not depend on the plasma point, so tabulate them once
    let basis: Vec<f64> = (0..ndofs)
        .flat_map(|k| {
            (0..nc).map(move |j| {
                let angle = m[k] as f64 * theta_coil[j] - n[k] as f64 * zeta_coil[j];
                let (s, c) = angle.sin_cos();
                s + c
            })
        })
        .collect();

    let mut gj = vec![0.0; np * ndofs];
    if ndofs > 0 {
        gj.par_chunks_mut(ndofs).enumerate().for_each(|(i, row)| {
            let gi = &gij[i * nc..(i + 1) * nc];
            for (k, out) in row.iter_mut().enumerate() {
                let bk = &basis[k * nc..(k + 1) * nc];
                *out = gi.iter().zip(bk).fold(0.0, |acc, (g, b)| g.mul_add(*b, acc));
            }
        });
    }

    // Stage 3: each task owns one row of the Gram matrix
    let nmag_inv: Vec<f64> = nrm_p
        .chunks_exact(3)
        .map(|v| 1.0 / rss3(v[0], v[1], v[2]))
        .collect();
    let mut ajk = vec![0.0; ndofs * ndofs];
    if ndofs > 0 {
        ajk.par_chunks_mut(ndofs).enumerate().for_each(|(j, row)| {
            for (k, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for i in 0..np {
                    // a * b == b * a exactly, so A[j, k] == A[k, j]
                    acc += gj[i * ndofs + j] * gj[i * ndofs + k] * nmag_inv[i];
                }
                *out = acc;
            }
        });
    }

    Ok(NormalFieldInfluence {
        gj: Array2::from_shape_vec((np, ndofs), gj)?,
        ajk: Array2::from_shape_vec((ndofs, ndofs), ajk)?,
    })
}

/// Normal field on the plasma surface from the net (secular) winding-surface currents.
///
/// # Arguments
///
/// * `points_plasma`: (m) plasma-surface quadrature points, shape `(np, 3)`
/// * `points_coil`:   (m) winding-surface quadrature points, shape `(nc, 3)`
/// * `normal_plasma`: (m^2) plasma-surface normals, shape `(np, 3)`; normalized internally
/// * `zeta_coil`:     (rad) toroidal angle of each winding-surface point, length `nc`
/// * `theta_coil`:    (rad) poloidal angle of each winding-surface point, length `nc`
/// * `g`:             (A) net poloidal current
/// * `i`:             (A) net toroidal current
/// * `gammadash1`:    (m) winding-surface tangent along the toroidal coordinate, shape `(nc, 3)`
/// * `gammadash2`:    (m) winding-surface tangent along the poloidal coordinate, shape `(nc, 3)`
///
/// Returns (T) normal field at each plasma point, length `np`.
///
/// # Commentary
///
/// The secular current sheet, already multiplied by its area weight, is
/// $|n| K = G \gamma_{,\theta} - I \gamma_{,\zeta}$, so no coil normal is needed.
/// The coil angles are validated but do not enter the kernel.
/// Add this to `gj . dofs` to get the total normal field, see [`total_normal_field`].
#[allow(clippy::too_many_arguments)]
pub fn winding_surface_field_bn_gi(
    points_plasma: ArrayView2<'_, f64>,
    points_coil: ArrayView2<'_, f64>,
    normal_plasma: ArrayView2<'_, f64>,
    zeta_coil: &[f64],
    theta_coil: &[f64],
    g: f64,
    i: f64,
    gammadash1: ArrayView2<'_, f64>,
    gammadash2: ArrayView2<'_, f64>,
) -> WsResult<Array1<f64>> {
    let xp = xyz_slice("plasma points", points_plasma, None)?;
    let np = xp.len() / 3;
    let xc = xyz_slice("coil points", points_coil, None)?;
    let nc = xc.len() / 3;
    let nrm_p = xyz_slice("plasma normal", normal_plasma, Some(np))?;
    check_len("zeta_coil", zeta_coil, nc)?;
    check_len("theta_coil", theta_coil, nc)?;
    let dg1 = xyz_slice("gammadash1", gammadash1, Some(nc))?;
    let dg2 = xyz_slice("gammadash2", gammadash2, Some(nc))?;

    debug!("secular normal field: {np} plasma points, {nc} coil points");

    // Secular current sheet is the same for every plasma point
    let gi: Vec<(f64, f64, f64)> = dg1
        .chunks_exact(3)
        .zip(dg2.chunks_exact(3))
        .map(|(d1, d2)| {
            (
                g.mul_add(d2[0], -i * d1[0]),
                g.mul_add(d2[1], -i * d1[1]),
                g.mul_add(d2[2], -i * d1[2]),
            )
        })
        .collect();

    let b_gi: Vec<f64> = (0..np)
        .into_par_iter()
        .map(|ip| {
            let (mut nx, mut ny, mut nz) = (nrm_p[3 * ip], nrm_p[3 * ip + 1], nrm_p[3 * ip + 2]);
            let nmag = rss3(nx, ny, nz);
            nx /= nmag;
            ny /= nmag;
            nz /= nmag;

            let mut acc = 0.0;
            for (j, &(gx, gy, gz)) in gi.iter().enumerate() {
                let rx = xp[3 * ip] - xc[3 * j];
                let ry = xp[3 * ip + 1] - xc[3 * j + 1];
                let rz = xp[3 * ip + 2] - xc[3 * j + 2];
                let rinv = 1.0 / rss3(rx, ry, rz);
                let rinv3 = rinv * rinv * rinv;

                let (cx, cy, cz) = cross3(gx, gy, gz, rx, ry, rz);
                acc = dot3(nx, ny, nz, cx, cy, cz).mul_add(rinv3, acc);
            }
            MU0_OVER_4PI * acc
        })
        .collect();

    Ok(Array1::from(b_gi))
}

/// Total normal field on the plasma surface, `gj . dofs + secular`.
///
/// # Arguments
///
/// * `gj`:      influence matrix from [`winding_surface_field_bn`], shape `(np, ndofs)`
/// * `dofs`:    current-potential DOFs, length `ndofs`
/// * `secular`: (T) output of [`winding_surface_field_bn_gi`], length `np`
pub fn total_normal_field(
    gj: ArrayView2<'_, f64>,
    dofs: &[f64],
    secular: &[f64],
) -> WsResult<Array1<f64>> {
    let (np, ndofs) = gj.dim();
    check_len("dofs", dofs, ndofs)?;
    check_len("secular", secular, np)?;

    let x = ndarray::ArrayView1::from(dofs);
    Ok(gj.dot(&x) + ndarray::ArrayView1::from(secular))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WindingSurfaceError;
    use crate::mesh::{torus_surface, uniform_quadpoints};
    use crate::physics::winding_surface::flux_density_winding_surface;
    use crate::spectral::{CurrentPotentialFourier, SpectralConfig};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use core::f64::consts::PI;
    use ndarray::array;

    #[test]
    fn test_single_pair_kernel() {
        let pp = array![[1.0, 0.5, -0.25]];
        let pc = array![[0.2, -0.3, 0.1]];
        let np_ = array![[0.0, 2.0, 0.0]];
        let nc_ = array![[0.3, 0.4, 1.2]];
        let (theta, zeta) = (0.7, 1.9);
        let m = [2];
        let n = [-3];

        let out = winding_surface_field_bn(
            pp.view(),
            pc.view(),
            np_.view(),
            nc_.view(),
            true,
            &[zeta],
            &[theta],
            &m,
            &n,
        )
        .unwrap();

        let (rx, ry, rz): (f64, f64, f64) = (0.8, 0.8, -0.35);
        let r: f64 = (rx * rx + ry * ry + rz * rz).sqrt();
        let npnc = 2.0 * 0.4;
        let rnp = ry * 2.0;
        let rnc = rx * 0.3 + ry * 0.4 + rz * 1.2;
        let g = 1e-7 * (npnc / r.powi(3) - 3.0 * rnp * rnc / r.powi(5));
        let angle = 2.0 * theta + 3.0 * zeta;
        let gj = g * (angle.sin() + angle.cos());

        assert_eq!(out.gj.dim(), (1, 1));
        assert_relative_eq!(out.gj[[0, 0]], gj, max_relative = 1e-12);
        assert_relative_eq!(out.ajk[[0, 0]], gj * gj / 2.0, max_relative = 1e-12);
    }

    #[test]
    fn test_gram_symmetric_and_psd_diagonal() {
        let qphi = uniform_quadpoints(8);
        let qtheta = uniform_quadpoints(6);
        let plasma = torus_surface(2.0, 0.3, &qphi, &qtheta).unwrap();
        let coil = torus_surface(2.0, 0.8, &qphi, &qtheta).unwrap();
        let zeta: Vec<f64> = qphi
            .iter()
            .flat_map(|&p| qtheta.iter().map(move |_| 2.0 * PI * p))
            .collect();
        let theta: Vec<f64> = qphi
            .iter()
            .flat_map(|_| qtheta.iter().map(|&t| 2.0 * PI * t))
            .collect();

        let cp = CurrentPotentialFourier::new(
            SpectralConfig {
                mpol: 2,
                ntor: 1,
                nfp: 1,
                stellsym: false,
            },
            0.0,
            0.0,
        )
        .unwrap();
        let (m, n) = cp.dof_modes();

        let out = winding_surface_field_bn(
            plasma.gamma.view(),
            coil.gamma.view(),
            plasma.normal.view(),
            coil.normal.view(),
            false,
            &zeta,
            &theta,
            &m,
            &n,
        )
        .unwrap();

        let nd = cp.num_dofs();
        assert_eq!(out.gj.dim(), (plasma.gamma.nrows(), nd));
        assert_eq!(out.ajk.dim(), (nd, nd));
        for j in 0..nd {
            assert!(out.ajk[[j, j]] >= 0.0);
            for k in 0..nd {
                assert_eq!(out.ajk[[j, k]], out.ajk[[k, j]]);
            }
        }
    }

    #[test]
    fn test_unnormalized_normals_weight_the_kernel() {
        let pp = array![[1.0, 0.5, -0.25], [-0.6, 1.1, 0.3]];
        let pc = array![[0.2, -0.3, 0.1], [0.4, 0.2, -0.5], [-0.1, 0.0, 0.6]];
        let np_ = array![[0.0, 1.0, 0.0], [0.6, 0.0, 0.8]];
        let nc_ = array![[0.3, 0.4, 1.2], [1.0, 0.0, 0.0], [0.0, -0.5, 0.5]];
        let zeta = [0.1, 1.4, 2.9];
        let theta = [0.5, -0.7, 2.2];
        let m = [0, 1, 2];
        let n = [2, -1, 0];
        let run = |np_: &Array2<f64>, nc_: &Array2<f64>| {
            winding_surface_field_bn(
                pp.view(),
                pc.view(),
                np_.view(),
                nc_.view(),
                false,
                &zeta,
                &theta,
                &m,
                &n,
            )
            .unwrap()
        };

        let (sp, sc) = (3.0, 0.25);
        let base = run(&np_, &nc_);
        let scaled = run(&np_.mapv(|v| sp * v), &nc_.mapv(|v| sc * v));

        // gj is bilinear in the normals; Ajk carries one more 1 / |n_p|
        for (a, b) in base.gj.iter().zip(scaled.gj.iter()) {
            assert_relative_eq!(sp * sc * a, *b, max_relative = 1e-12);
        }
        for (a, b) in base.ajk.iter().zip(scaled.ajk.iter()) {
            assert_relative_eq!(sp * sc * sc * a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_secular_term_matches_field_evaluator() {
        // B_GI . n_hat must equal the normal component of B from the secular current sheet
        let qphi = uniform_quadpoints(10);
        let qtheta = uniform_quadpoints(8);
        let plasma = torus_surface(2.0, 0.3, &qphi, &qtheta).unwrap();
        let coil = torus_surface(2.0, 0.9, &qphi, &qtheta).unwrap();
        let zeta = vec![0.0; coil.gamma.nrows()];
        let theta = vec![0.0; coil.gamma.nrows()];
        let (g, i_tor) = (8.0e5, 2.5e4);

        let bn = winding_surface_field_bn_gi(
            plasma.gamma.view(),
            coil.gamma.view(),
            plasma.normal.view(),
            &zeta,
            &theta,
            g,
            i_tor,
            coil.gammadash1.view(),
            coil.gammadash2.view(),
        )
        .unwrap();

        let cp = CurrentPotentialFourier::new(
            SpectralConfig {
                mpol: 1,
                ntor: 1,
                nfp: 1,
                stellsym: true,
            },
            g,
            i_tor,
        )
        .unwrap();
        let k = cp
            .surface_current(
                coil.normal.view(),
                coil.gammadash1.view(),
                coil.gammadash2.view(),
                &qphi,
                &qtheta,
            )
            .unwrap();
        let b = flux_density_winding_surface(
            plasma.gamma.view(),
            coil.gamma.view(),
            coil.normal.view(),
            k.view(),
        )
        .unwrap();

        let scale = bn.iter().map(|v| v.abs()).fold(0.0, f64::max);
        assert!(scale > 0.0);
        for ip in 0..bn.len() {
            let nv = plasma.normal.row(ip);
            let nmag = rss3(nv[0], nv[1], nv[2]);
            let expected = dot3(b[[ip, 0]], b[[ip, 1]], b[[ip, 2]], nv[0], nv[1], nv[2]) / nmag;
            assert_abs_diff_eq!(bn[ip], expected, epsilon = 1e-10 * scale);
        }
    }

    #[test]
    fn test_total_normal_field() {
        let gj = array![[1.0, 2.0], [0.5, -1.0], [0.0, 3.0]];
        let out = total_normal_field(gj.view(), &[2.0, -1.0], &[0.1, 0.2, 0.3]).unwrap();
        for (got, want) in out.iter().zip([0.1, 2.2, -2.7]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-15);
        }

        assert!(matches!(
            total_normal_field(gj.view(), &[1.0], &[0.0; 3]),
            Err(WindingSurfaceError::Length { name: "dofs", .. })
        ));
    }

    #[test]
    fn test_mode_length_mismatch() {
        let p = array![[1.0, 0.0, 0.0]];
        let res = winding_surface_field_bn(
            p.view(),
            p.view(),
            p.view(),
            p.view(),
            true,
            &[0.0],
            &[0.0],
            &[1, 2],
            &[1],
        );
        assert!(matches!(res, Err(WindingSurfaceError::Length { name: "n", .. })));
    }
}
