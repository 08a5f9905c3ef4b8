//! Electromagnetics calculations.
pub mod normal_field;
pub mod winding_surface;

pub use normal_field::{
    total_normal_field, winding_surface_field_bn, winding_surface_field_bn_gi,
    NormalFieldInfluence,
};
pub use winding_surface::{
    flux_density_gradient_winding_surface, flux_density_winding_surface,
    vector_potential_gradient_winding_surface, vector_potential_winding_surface,
};
