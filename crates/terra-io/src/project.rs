//! Versioned project documents.
//!
//! A project file carries everything a replay needs: mesh, materials,
//! loads, water levels, the phase tree, and solver settings. The version
//! tag is checked before anything else; unknown versions are rejected
//! without touching the payload.

use crate::error::{IoError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use terra_model::{Load, MaterialSet, Mesh, PhaseTree, SolverSettings, WaterLevel};

/// The single version this build reads and writes
pub const PROJECT_VERSION: &str = "terra/1";

/// A complete solver input document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Format version tag; must equal [`PROJECT_VERSION`]
    pub version: String,
    /// Project display name
    #[serde(default)]
    pub name: String,
    /// The finished mesh from the external triangulator
    pub mesh: Mesh,
    /// Material definitions
    pub materials: MaterialSet,
    /// Load definitions
    #[serde(default)]
    pub loads: Vec<Load>,
    /// Water level definitions
    #[serde(default)]
    pub water_levels: Vec<WaterLevel>,
    /// The phase tree
    pub phases: PhaseTree,
    /// Solver settings; defaults apply to absent fields
    #[serde(default)]
    pub settings: SolverSettings,
}

impl Project {
    /// Create an empty project with the current version tag
    pub fn new(name: &str) -> Self {
        Self {
            version: PROJECT_VERSION.to_string(),
            name: name.to_string(),
            mesh: Mesh::new(),
            materials: MaterialSet::new(),
            loads: Vec::new(),
            water_levels: Vec::new(),
            phases: PhaseTree::new(),
            settings: SolverSettings::default(),
        }
    }

    /// Parse a project from JSON text, validating the version tag first.
    pub fn from_json(text: &str) -> Result<Self> {
        // Peek at the version before deserializing the full payload so a
        // schema mismatch in a future version reports cleanly.
        #[derive(Deserialize)]
        struct VersionProbe {
            version: String,
        }
        let probe: VersionProbe = serde_json::from_str(text)?;
        if probe.version != PROJECT_VERSION {
            return Err(IoError::UnsupportedVersion {
                found: probe.version,
                expected: PROJECT_VERSION.to_string(),
            });
        }
        let project: Project = serde_json::from_str(text)?;
        project.validate()?;
        Ok(project)
    }

    /// Load a project from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IoError::FileNotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Structural validation shared by load and save paths.
    pub fn validate(&self) -> Result<()> {
        self.mesh.validate().map_err(IoError::InvalidData)?;
        self.materials.validate().map_err(IoError::InvalidData)?;
        self.phases.validate().map_err(IoError::InvalidData)?;
        self.settings.validate().map_err(IoError::InvalidData)?;
        Ok(())
    }
}
