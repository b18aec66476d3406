//! External load definitions: point loads and line loads.
//!
//! Loads carry stable identities; phases activate them by identity. The
//! assembler maps point loads to mesh nodes and integrates line loads over
//! the element edges they cross.

use crate::ids::LoadId;
use serde::{Deserialize, Serialize};

/// A point or line load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Load {
    /// Concentrated force at a world position [kN]
    Point {
        /// Load identity
        id: LoadId,
        /// World position (x, y)
        position: [f64; 2],
        /// Force vector (fx, fy)
        force: [f64; 2],
    },
    /// Distributed force per unit length along a segment [kN/m]
    Line {
        /// Load identity
        id: LoadId,
        /// Segment start
        p1: [f64; 2],
        /// Segment end
        p2: [f64; 2],
        /// Force per unit length (fx, fy)
        force: [f64; 2],
    },
}

impl Load {
    /// The load's identity
    pub fn id(&self) -> LoadId {
        match self {
            Load::Point { id, .. } | Load::Line { id, .. } => *id,
        }
    }

    /// Total force resultant of the load [kN]
    pub fn resultant(&self) -> [f64; 2] {
        match self {
            Load::Point { force, .. } => *force,
            Load::Line { p1, p2, force, .. } => {
                let length = ((p2[0] - p1[0]).powi(2) + (p2[1] - p1[1]).powi(2)).sqrt();
                [force[0] * length, force[1] * length]
            }
        }
    }
}
