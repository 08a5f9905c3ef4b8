//! Fourier representation of the winding-surface current potential.
//!
//! The potential is
//!
//! $\Phi(\phi, \theta) = \sum_{m=0}^{m_{pol}} \sum_{n=-n_{tor}}^{n_{tor}}
//!   \Phi_s^{mn} \sin(2\pi(m\theta - n N_{fp} \phi)) + \Phi_c^{mn} \cos(2\pi(m\theta - n N_{fp} \phi))$
//!
//! over normalized coordinates `phi, theta` in `[0, 1)`. Coefficients live in
//! dense `(mpol + 1, 2 ntor + 1)` arrays with the toroidal index shifted by
//! `ntor`. Only part of each array is free: the `m = 0, n <= 0` sine entries
//! are redundant and stay zero, and under stellarator symmetry there is no
//! cosine array at all.
use core::f64::consts::PI;

use log::debug;
use ndarray::{Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{WindingSurfaceError, WsResult};
use crate::layout::{check_len, xyz_slice};
use crate::math::rss3;

fn default_nfp() -> usize {
    1
}

/// Spectral resolution of the current potential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// Highest poloidal mode number
    pub mpol: usize,
    /// Highest toroidal mode number, in units of `nfp`
    pub ntor: usize,
    /// Number of field periods
    #[serde(default = "default_nfp")]
    pub nfp: usize,
    /// Stellarator symmetry; keeps only the sine coefficients
    #[serde(default)]
    pub stellsym: bool,
}

impl SpectralConfig {
    pub fn validate(&self) -> WsResult<()> {
        if self.nfp == 0 {
            return Err(WindingSurfaceError::Config(
                "number of field periods must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of toroidal modes, `2 ntor + 1`
    pub fn ntoroidal(&self) -> usize {
        2 * self.ntor + 1
    }

    /// Number of entries in each dense coefficient array
    pub fn ncoeffs(&self) -> usize {
        (self.mpol + 1) * self.ntoroidal()
    }

    /// Length of the DOF vector.
    ///
    /// * stellarator symmetric: `mpol (2 ntor + 1) + ntor`
    /// * general: `2 (mpol + 1)(2 ntor + 1) - 2 ntor - 1`
    pub fn num_dofs(&self) -> usize {
        let nsin = self.ncoeffs() - self.ntor - 1;
        if self.stellsym {
            nsin
        } else {
            nsin + self.ncoeffs() - self.ntor
        }
    }
}

/// Flat row-major index of mode `(m, n)`, toroidal index fastest.
///
/// `m` in `[0, mpol]`, `n` in `[-ntor, ntor]`.
#[inline]
pub fn coefficient_index(m: usize, n: i64, ntor: usize) -> usize {
    m * (2 * ntor + 1) + (n + ntor as i64) as usize
}

/// Inverse of [`coefficient_index`].
#[inline]
pub fn coefficient_mode(index: usize, ntor: usize) -> (usize, i64) {
    let nt = 2 * ntor + 1;
    (index / nt, (index % nt) as i64 - ntor as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    Sine,
    Cosine,
}

/// Location of one DOF in the dense coefficient storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DofSlot {
    pub parity: Parity,
    /// Poloidal mode number
    pub m: usize,
    /// Toroidal mode number, in units of `nfp`
    pub n: i64,
}

impl DofSlot {
    /// Flat index of this slot in its dense coefficient array.
    #[inline]
    pub fn index(&self, ntor: usize) -> usize {
        coefficient_index(self.m, self.n, ntor)
    }
}

/// DOF ordering shared by packing and unpacking.
///
/// Sine entries from flat index `ntor + 1` to the end, then (without
/// stellarator symmetry) cosine entries from flat index `ntor` to the end.
pub fn dof_slots(config: &SpectralConfig) -> impl Iterator<Item = DofSlot> {
    let ntor = config.ntor;
    let ncoeffs = config.ncoeffs();
    let ncos_start = if config.stellsym { ncoeffs } else { ntor };

    let slot = move |parity: Parity, i: usize| {
        let (m, n) = coefficient_mode(i, ntor);
        DofSlot { parity, m, n }
    };

    (ntor + 1..ncoeffs)
        .map(move |i| slot(Parity::Sine, i))
        .chain((ncos_start..ncoeffs).map(move |i| slot(Parity::Cosine, i)))
}

/// Dense coefficient storage, tagged by symmetry.
#[derive(Debug, Clone, PartialEq)]
pub enum FourierCoefficients {
    /// Stellarator symmetric: sine coefficients only
    SymmetricSine { phis: Array2<f64> },
    /// No symmetry: sine and cosine coefficients
    General { phis: Array2<f64>, phic: Array2<f64> },
}

impl FourierCoefficients {
    pub fn zeros(config: &SpectralConfig) -> Self {
        let shape = (config.mpol + 1, config.ntoroidal());
        if config.stellsym {
            Self::SymmetricSine {
                phis: Array2::zeros(shape),
            }
        } else {
            Self::General {
                phis: Array2::zeros(shape),
                phic: Array2::zeros(shape),
            }
        }
    }

    pub fn phis(&self) -> &Array2<f64> {
        match self {
            Self::SymmetricSine { phis } | Self::General { phis, .. } => phis,
        }
    }

    /// Cosine coefficients, absent under stellarator symmetry.
    pub fn phic(&self) -> Option<&Array2<f64>> {
        match self {
            Self::SymmetricSine { .. } => None,
            Self::General { phic, .. } => Some(phic),
        }
    }

    /// Sine and cosine amplitude at dense position `[m, n + ntor]`, zero if not stored.
    #[inline]
    fn mode(&self, m: usize, j: usize) -> (f64, f64) {
        match self {
            Self::SymmetricSine { phis } => (phis[[m, j]], 0.0),
            Self::General { phis, phic } => (phis[[m, j]], phic[[m, j]]),
        }
    }

    /// Amplitude addressed by a DOF slot.
    fn slot(&self, slot: DofSlot, ntor: usize) -> f64 {
        let idx = dense_position(self.phis(), slot.index(ntor));
        let (sin, cos) = self.mode(idx[0], idx[1]);
        match slot.parity {
            Parity::Sine => sin,
            Parity::Cosine => cos,
        }
    }

    fn slot_mut(&mut self, slot: DofSlot, ntor: usize) -> WsResult<&mut f64> {
        let idx = dense_position(self.phis(), slot.index(ntor));
        match (self, slot.parity) {
            (Self::SymmetricSine { phis } | Self::General { phis, .. }, Parity::Sine) => {
                Ok(&mut phis[idx])
            }
            (Self::General { phic, .. }, Parity::Cosine) => Ok(&mut phic[idx]),
            (Self::SymmetricSine { .. }, Parity::Cosine) => {
                Err(WindingSurfaceError::Config(format!(
                    "no cosine storage for mode ({}, {}) under stellarator symmetry",
                    slot.m, slot.n
                )))
            }
        }
    }
}

/// Row and column of a flat row-major index in a dense coefficient array.
#[inline]
fn dense_position(a: &Array2<f64>, index: usize) -> [usize; 2] {
    let nt = a.ncols();
    [index / nt, index % nt]
}

/// Which quantity [`CurrentPotentialFourier`] evaluates on a grid.
#[derive(Clone, Copy)]
enum Derivative {
    None,
    Phi,
    Theta,
}

/// Current potential as a truncated Fourier series plus net (secular) currents.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentPotentialFourier {
    config: SpectralConfig,
    coeffs: FourierCoefficients,
    net_poloidal_current_amperes: f64,
    net_toroidal_current_amperes: f64,
}

impl CurrentPotentialFourier {
    /// Zero-initialized potential.
    ///
    /// # Arguments
    ///
    /// * `config`: spectral resolution, fixed for the lifetime of the object
    /// * `net_poloidal_current_amperes`: (A) secular potential gradient `G`
    /// * `net_toroidal_current_amperes`: (A) secular potential gradient `I`
    pub fn new(
        config: SpectralConfig,
        net_poloidal_current_amperes: f64,
        net_toroidal_current_amperes: f64,
    ) -> WsResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            coeffs: FourierCoefficients::zeros(&config),
            net_poloidal_current_amperes,
            net_toroidal_current_amperes,
        })
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    pub fn coefficients(&self) -> &FourierCoefficients {
        &self.coeffs
    }

    pub fn net_poloidal_current_amperes(&self) -> f64 {
        self.net_poloidal_current_amperes
    }

    pub fn net_toroidal_current_amperes(&self) -> f64 {
        self.net_toroidal_current_amperes
    }

    pub fn num_dofs(&self) -> usize {
        self.config.num_dofs()
    }

    /// Pack the free coefficients into a fresh DOF vector.
    pub fn dofs(&self) -> Vec<f64> {
        let ntor = self.config.ntor;
        dof_slots(&self.config)
            .map(|s| self.coeffs.slot(s, ntor))
            .collect()
    }

    /// Unpack a DOF vector into the dense coefficients, in place.
    ///
    /// Entries that are not DOFs are left at zero.
    pub fn set_dofs(&mut self, dofs: &[f64]) -> WsResult<()> {
        check_len("dofs", dofs, self.num_dofs())?;
        let ntor = self.config.ntor;
        for (slot, &v) in dof_slots(&self.config).zip(dofs) {
            *self.coeffs.slot_mut(slot, ntor)? = v;
        }
        Ok(())
    }

    /// Poloidal and toroidal mode number of each DOF, in DOF order.
    ///
    /// Toroidal numbers are multiplied by `nfp`, so `m theta - n zeta` with
    /// `theta, zeta` in radians is the basis angle of each DOF.
    pub fn dof_modes(&self) -> (Vec<i32>, Vec<i32>) {
        let nfp = self.config.nfp as i64;
        dof_slots(&self.config)
            .map(|s| (s.m as i32, (s.n * nfp) as i32))
            .unzip()
    }

    fn evaluate(
        &self,
        quadpoints_phi: &[f64],
        quadpoints_theta: &[f64],
        which: Derivative,
    ) -> Array2<f64> {
        let SpectralConfig { mpol, ntor, nfp, .. } = self.config;
        let mut out = Array2::zeros((quadpoints_phi.len(), quadpoints_theta.len()));

        for (i, &phi) in quadpoints_phi.iter().enumerate() {
            for (j, &theta) in quadpoints_theta.iter().enumerate() {
                let mut acc = 0.0;
                for m in 0..=mpol {
                    for jn in 0..(2 * ntor + 1) {
                        let (sin_amp, cos_amp) = self.coeffs.mode(m, jn);
                        if sin_amp == 0.0 && cos_amp == 0.0 {
                            continue;
                        }
                        let n = jn as f64 - ntor as f64;
                        let angle = 2.0 * PI * (m as f64 * theta - n * nfp as f64 * phi);
                        let (s, c) = angle.sin_cos();
                        acc += match which {
                            Derivative::None => sin_amp.mul_add(s, cos_amp * c),
                            Derivative::Phi => {
                                -2.0 * PI * n * nfp as f64 * sin_amp.mul_add(c, -cos_amp * s)
                            }
                            Derivative::Theta => {
                                2.0 * PI * m as f64 * sin_amp.mul_add(c, -cos_amp * s)
                            }
                        };
                    }
                }
                out[[i, j]] = acc;
            }
        }

        out
    }

    /// Periodic part of the potential on the `(nphi, ntheta)` tensor grid.
    pub fn phi(&self, quadpoints_phi: &[f64], quadpoints_theta: &[f64]) -> Array2<f64> {
        self.evaluate(quadpoints_phi, quadpoints_theta, Derivative::None)
    }

    /// Derivative of the periodic potential w.r.t. normalized `phi`.
    pub fn phidash1(&self, quadpoints_phi: &[f64], quadpoints_theta: &[f64]) -> Array2<f64> {
        self.evaluate(quadpoints_phi, quadpoints_theta, Derivative::Phi)
    }

    /// Derivative of the periodic potential w.r.t. normalized `theta`.
    pub fn phidash2(&self, quadpoints_phi: &[f64], quadpoints_theta: &[f64]) -> Array2<f64> {
        self.evaluate(quadpoints_phi, quadpoints_theta, Derivative::Theta)
    }

    fn dofs_jacobian(
        &self,
        quadpoints_phi: &[f64],
        quadpoints_theta: &[f64],
        which: Derivative,
    ) -> Array3<f64> {
        let nfp = self.config.nfp as f64;
        let slots: Vec<DofSlot> = dof_slots(&self.config).collect();
        let mut out = Array3::zeros((quadpoints_phi.len(), quadpoints_theta.len(), slots.len()));

        for (i, &phi) in quadpoints_phi.iter().enumerate() {
            for (j, &theta) in quadpoints_theta.iter().enumerate() {
                for (k, slot) in slots.iter().enumerate() {
                    let m = slot.m as f64;
                    let n = slot.n as f64 * nfp;
                    let (s, c) = (2.0 * PI * (m * theta - n * phi)).sin_cos();
                    // Basis value and its derivative w.r.t. the angle
                    let (basis, dbasis) = match slot.parity {
                        Parity::Sine => (s, c),
                        Parity::Cosine => (c, -s),
                    };
                    out[[i, j, k]] = match which {
                        Derivative::None => basis,
                        Derivative::Phi => -2.0 * PI * n * dbasis,
                        Derivative::Theta => 2.0 * PI * m * dbasis,
                    };
                }
            }
        }

        out
    }

    /// Derivative of the potential w.r.t. each DOF, shape `(nphi, ntheta, ndofs)`.
    pub fn dphi_by_dcoeff(&self, quadpoints_phi: &[f64], quadpoints_theta: &[f64]) -> Array3<f64> {
        self.dofs_jacobian(quadpoints_phi, quadpoints_theta, Derivative::None)
    }

    /// Derivative of [`Self::phidash1`] w.r.t. each DOF, shape `(nphi, ntheta, ndofs)`.
    ///
    /// `phidash1` is linear in the DOFs, so contracting the last axis with
    /// [`Self::dofs`] reproduces it.
    pub fn dphidash1_by_dcoeff(
        &self,
        quadpoints_phi: &[f64],
        quadpoints_theta: &[f64],
    ) -> Array3<f64> {
        self.dofs_jacobian(quadpoints_phi, quadpoints_theta, Derivative::Phi)
    }

    /// Derivative of [`Self::phidash2`] w.r.t. each DOF, shape `(nphi, ntheta, ndofs)`.
    pub fn dphidash2_by_dcoeff(
        &self,
        quadpoints_phi: &[f64],
        quadpoints_theta: &[f64],
    ) -> Array3<f64> {
        self.dofs_jacobian(quadpoints_phi, quadpoints_theta, Derivative::Theta)
    }

    /// Surface current density on the winding-surface quadrature grid.
    ///
    /// $K = ((\Phi_{,\phi} + G)\, \gamma_{,\theta} - (\Phi_{,\theta} + I)\, \gamma_{,\phi}) / |n|$
    ///
    /// # Arguments
    ///
    /// * `normal`:     (m^2) unnormalized surface normal, shape `(nphi * ntheta, 3)`, phi-major
    /// * `gammadash1`: (m) surface tangent w.r.t. normalized `phi`, same shape
    /// * `gammadash2`: (m) surface tangent w.r.t. normalized `theta`, same shape
    ///
    /// Returns (A/m) K, shape `(nphi * ntheta, 3)`, ready for the winding-surface field evaluators.
    pub fn surface_current(
        &self,
        normal: ArrayView2<'_, f64>,
        gammadash1: ArrayView2<'_, f64>,
        gammadash2: ArrayView2<'_, f64>,
        quadpoints_phi: &[f64],
        quadpoints_theta: &[f64],
    ) -> WsResult<Array2<f64>> {
        let n = quadpoints_phi.len() * quadpoints_theta.len();
        let normal = xyz_slice("winding surface normal", normal, Some(n))?;
        let dg1 = xyz_slice("gammadash1", gammadash1, Some(n))?;
        let dg2 = xyz_slice("gammadash2", gammadash2, Some(n))?;

        debug!(
            "surface current: {} dofs on {} quadrature points",
            self.num_dofs(),
            n
        );

        let phid1 = self.phidash1(quadpoints_phi, quadpoints_theta);
        let phid2 = self.phidash2(quadpoints_phi, quadpoints_theta);
        let g = self.net_poloidal_current_amperes;
        let i_tor = self.net_toroidal_current_amperes;

        let mut k = Array2::zeros((n, 3));
        for (row, (a, b)) in phid1.iter().zip(phid2.iter()).enumerate() {
            let nv = &normal[3 * row..3 * row + 3];
            let nmag_inv = 1.0 / rss3(nv[0], nv[1], nv[2]);
            let cg = (a + g) * nmag_inv;
            let ci = (b + i_tor) * nmag_inv;
            for c in 0..3 {
                k[[row, c]] = cg.mul_add(dg2[3 * row + c], -ci * dg1[3 * row + c]);
            }
        }

        Ok(k)
    }
}
