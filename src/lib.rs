#![allow(non_snake_case)]

pub mod error;
pub mod layout;
pub mod math;
pub mod mesh;
pub mod physics;
pub mod spectral;

pub use error::{WindingSurfaceError, WsResult};

/// (H/m) vacuum magnetic permeability, pre-2019 SI definition.
pub const MU_0: f64 = core::f64::consts::PI * 4e-7; // [H/m]

/// (H/m) Recurring constant multiple of `mu_0`.
/// Exact value 1e-7 rather than `MU_0 / 4pi` to avoid an extra rounding in every kernel.
pub const MU0_OVER_4PI: f64 = 1e-7;
