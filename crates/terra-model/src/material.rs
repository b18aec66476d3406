//! Material definitions for the geotechnical solver.
//!
//! A material couples an elastic law, a drainage mode, unit weights, and
//! strength parameters. Validation runs before any solve; a material that
//! passes `validate()` is complete for its drainage mode.

use crate::ids::MaterialId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Poisson's ratio used for the near-incompressible undrained variants.
pub const UNDRAINED_POISSON: f64 = 0.495;

/// Constitutive model type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaterialModel {
    /// Linear elastic isotropic
    #[default]
    LinearElastic,
    /// Mohr-Coulomb elasto-plastic
    MohrCoulomb,
}

/// Drainage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Drainage {
    /// Effective-stress analysis, no excess pore pressure
    #[default]
    Drained,
    /// Effective-stress stiffness and strength (c', phi'), excess pore
    /// pressure from a fluid bulk penalty
    UndrainedA,
    /// Effective-stress stiffness, undrained shear strength Su
    UndrainedB,
    /// Total-stress analysis with Su; no pore-pressure split
    UndrainedC,
    /// Structural material: no pore water at all
    NonPorous,
}

impl Drainage {
    /// Whether this mode carries pore-water pressure fields
    pub fn is_porous(&self) -> bool {
        !matches!(self, Drainage::NonPorous)
    }

    /// Whether this mode generates excess pore pressure
    pub fn generates_excess_pwp(&self) -> bool {
        matches!(self, Drainage::UndrainedA | Drainage::UndrainedB)
    }
}

/// A material definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Material identity
    pub id: MaterialId,
    /// Display name
    pub name: String,
    /// Constitutive model
    pub model: MaterialModel,
    /// Drainage mode
    pub drainage: Drainage,
    /// Young's modulus E (total-stress) or E' (effective-stress) [kPa]
    pub elastic_modulus: f64,
    /// Poisson's ratio; forced to 0.495 for UndrainedB/C by `effective_poisson`
    pub poisson: f64,
    /// Saturated unit weight [kN/m3]; the single unit weight for NonPorous
    pub gamma_sat: f64,
    /// Unsaturated unit weight [kN/m3]; ignored for NonPorous
    pub gamma_unsat: f64,
    /// Effective cohesion c' [kPa]
    #[serde(default)]
    pub cohesion: Option<f64>,
    /// Friction angle phi [degrees]
    #[serde(default)]
    pub friction_deg: Option<f64>,
    /// Dilation angle psi [degrees]
    #[serde(default)]
    pub dilation_deg: Option<f64>,
    /// Undrained shear strength Su [kPa]
    #[serde(default)]
    pub su: Option<f64>,
    /// Lateral earth-pressure coefficient at rest; derived when absent
    #[serde(default)]
    pub k0: Option<f64>,
}

impl Material {
    /// Create a drained linear-elastic material with the given stiffness
    pub fn elastic(id: MaterialId, name: &str, e: f64, nu: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            model: MaterialModel::LinearElastic,
            drainage: Drainage::Drained,
            elastic_modulus: e,
            poisson: nu,
            gamma_sat: 20.0,
            gamma_unsat: 18.0,
            cohesion: None,
            friction_deg: None,
            dilation_deg: None,
            su: None,
            k0: None,
        }
    }

    /// Create a drained Mohr-Coulomb material
    pub fn mohr_coulomb(
        id: MaterialId,
        name: &str,
        e: f64,
        nu: f64,
        cohesion: f64,
        friction_deg: f64,
        dilation_deg: f64,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            model: MaterialModel::MohrCoulomb,
            drainage: Drainage::Drained,
            elastic_modulus: e,
            poisson: nu,
            gamma_sat: 20.0,
            gamma_unsat: 18.0,
            cohesion: Some(cohesion),
            friction_deg: Some(friction_deg),
            dilation_deg: Some(dilation_deg),
            su: None,
            k0: None,
        }
    }

    /// Set the unit weights
    pub fn with_unit_weights(mut self, gamma_sat: f64, gamma_unsat: f64) -> Self {
        self.gamma_sat = gamma_sat;
        self.gamma_unsat = gamma_unsat;
        self
    }

    /// Set the drainage mode
    pub fn with_drainage(mut self, drainage: Drainage) -> Self {
        self.drainage = drainage;
        self
    }

    /// Set the at-rest coefficient explicitly
    pub fn with_k0(mut self, k0: f64) -> Self {
        self.k0 = Some(k0);
        self
    }

    /// Poisson's ratio that actually enters the elastic tangent.
    ///
    /// UndrainedC runs on total stress and enforces near-incompressibility
    /// by construction; the stored value is ignored for it. UndrainedA/B
    /// use the effective ratio and reach incompressibility through the
    /// fluid bulk penalty instead.
    pub fn effective_poisson(&self) -> f64 {
        match self.drainage {
            Drainage::UndrainedC => UNDRAINED_POISSON,
            _ => self.poisson,
        }
    }

    /// Shear modulus G from E and the effective Poisson's ratio
    pub fn shear_modulus(&self) -> f64 {
        self.elastic_modulus / (2.0 * (1.0 + self.effective_poisson()))
    }

    /// Bulk modulus K from E and the effective Poisson's ratio
    pub fn bulk_modulus(&self) -> f64 {
        self.elastic_modulus / (3.0 * (1.0 - 2.0 * self.effective_poisson()))
    }

    /// Friction angle in radians; zero when strength is Su-based
    pub fn friction_rad(&self) -> f64 {
        match self.drainage {
            Drainage::UndrainedB | Drainage::UndrainedC => 0.0,
            _ => self.friction_deg.unwrap_or(0.0).to_radians(),
        }
    }

    /// Dilation angle in radians
    pub fn dilation_rad(&self) -> f64 {
        match self.drainage {
            Drainage::UndrainedB | Drainage::UndrainedC => 0.0,
            _ => self.dilation_deg.unwrap_or(0.0).to_radians(),
        }
    }

    /// Cohesion entering the yield function: c' for effective-stress
    /// modes, Su for the Su-based undrained variants.
    pub fn yield_cohesion(&self) -> f64 {
        match self.drainage {
            Drainage::UndrainedB | Drainage::UndrainedC => self.su.unwrap_or(0.0),
            _ => self.cohesion.unwrap_or(0.0),
        }
    }

    /// At-rest lateral pressure coefficient: the explicit value when set,
    /// Jaky's 1 - sin(phi) when a friction angle is available, otherwise
    /// the elastic nu/(1 - nu).
    pub fn k0_coefficient(&self) -> f64 {
        if let Some(k0) = self.k0 {
            return k0;
        }
        if let Some(phi) = self.friction_deg {
            if phi > 0.0 {
                return 1.0 - phi.to_radians().sin();
            }
        }
        let nu = self.effective_poisson();
        nu / (1.0 - nu)
    }

    /// Unit weight at a point: saturated below the water table, unsaturated
    /// above. NonPorous materials have a single weight.
    pub fn unit_weight(&self, below_water_table: bool) -> f64 {
        if !self.drainage.is_porous() || below_water_table {
            self.gamma_sat
        } else {
            self.gamma_unsat
        }
    }

    /// Validate parameter ranges for the selected model and drainage mode.
    pub fn validate(&self) -> Result<(), String> {
        if self.elastic_modulus <= 0.0 {
            return Err(format!(
                "material {} ({}): elastic modulus must be positive",
                self.id, self.name
            ));
        }
        match self.drainage {
            Drainage::Drained | Drainage::UndrainedA | Drainage::UndrainedB => {
                if !(0.0..0.5).contains(&self.poisson) {
                    return Err(format!(
                        "material {} ({}): Poisson's ratio {} outside [0, 0.5)",
                        self.id, self.name, self.poisson
                    ));
                }
            }
            // nu is pinned to 0.495 by construction for C
            Drainage::UndrainedC | Drainage::NonPorous => {}
        }
        if self.drainage.is_porous() && self.gamma_unsat > self.gamma_sat {
            return Err(format!(
                "material {} ({}): gamma_unsat {} exceeds gamma_sat {}",
                self.id, self.name, self.gamma_unsat, self.gamma_sat
            ));
        }
        if self.model == MaterialModel::MohrCoulomb {
            match self.drainage {
                Drainage::UndrainedB | Drainage::UndrainedC => {
                    if self.su.is_none() {
                        return Err(format!(
                            "material {} ({}): undrained shear strength Su required for {:?}",
                            self.id, self.name, self.drainage
                        ));
                    }
                }
                _ => {
                    if self.cohesion.is_none() || self.friction_deg.is_none() {
                        return Err(format!(
                            "material {} ({}): c' and phi required for {:?}",
                            self.id, self.name, self.drainage
                        ));
                    }
                    let phi = self.friction_deg.unwrap_or(0.0);
                    let psi = self.dilation_deg.unwrap_or(0.0);
                    if psi < 0.0 || psi > phi {
                        return Err(format!(
                            "material {} ({}): dilation angle must satisfy 0 <= psi <= phi",
                            self.id, self.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// All materials of a project, keyed by identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialSet {
    materials: HashMap<MaterialId, Material>,
}

impl MaterialSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a material
    pub fn insert(&mut self, material: Material) {
        self.materials.insert(material.id, material);
    }

    /// Look up a material
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    /// Number of materials
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Iterate in identity order (deterministic)
    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        let mut sorted: Vec<_> = self.materials.values().collect();
        sorted.sort_by_key(|m| m.id);
        sorted.into_iter()
    }

    /// Validate every material in the set
    pub fn validate(&self) -> Result<(), String> {
        for material in self.iter() {
            material.validate()?;
        }
        Ok(())
    }
}
