//! Pore-water-pressure computation.
//!
//! Steady-state pressure comes from a piecewise-linear phreatic surface:
//! linear interpolation of the water elevation along x, hydrostatic below.
//! Excess pressure is generated only by undrained A/B materials from the
//! volumetric strain increment (see `MaterialLaw::excess_pwp_increment`).
//! All pressures are pressure positive; total = steady + excess.

use terra_model::WaterLevel;

/// Unit weight of water [kN/m3]
pub const GAMMA_WATER: f64 = 9.81;

/// Steady pore pressure at a point for an optional water level.
///
/// Zero above the phreatic surface (and everywhere when no water level is
/// active), gamma_w times the depth below it otherwise.
pub fn steady_pwp(water: Option<&WaterLevel>, x: f64, y: f64) -> f64 {
    let Some(level) = water else {
        return 0.0;
    };
    match level.surface_elevation(x) {
        Some(yw) if y < yw => GAMMA_WATER * (yw - y),
        _ => 0.0,
    }
}

/// Whether a point lies below the active phreatic surface
pub fn below_water_table(water: Option<&WaterLevel>, x: f64, y: f64) -> bool {
    water.map(|level| level.is_below(x, y)).unwrap_or(false)
}
