//! Staged-construction phases and the phase tree.
//!
//! Phases form a tree: each phase inherits the converged state of its
//! parent. The tree is stored as an arena with integer parent indices;
//! execution order is depth-first.

use crate::ids::{LoadId, MaterialId, PhaseId, PolygonTag, WaterLevelId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What a phase computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Initial stress from K0 and the vertical soil column; no deformation
    K0Procedure,
    /// Initial stress from a plastic solve under body forces
    GravityLoading,
    /// Staged elasto-plastic loading step
    Plastic,
    /// Strength-reduction safety analysis
    SafetyAnalysis,
}

impl PhaseKind {
    /// Whether this kind establishes the initial stress of a branch
    pub fn is_initial(&self) -> bool {
        matches!(self, PhaseKind::K0Procedure | PhaseKind::GravityLoading)
    }
}

/// A single phase descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Phase identity
    pub id: PhaseId,
    /// Display name
    pub name: String,
    /// What to compute
    pub kind: PhaseKind,
    /// Parent phase; `None` for a branch root
    pub parent: Option<PhaseId>,
    /// Polygons whose elements participate in this phase
    pub active_polygons: BTreeSet<PolygonTag>,
    /// Loads applied in this phase
    pub active_loads: BTreeSet<LoadId>,
    /// Water level governing steady pore pressure; `None` means dry
    pub water_level: Option<WaterLevelId>,
    /// Per-polygon material replacements (Plastic and K0 phases only)
    #[serde(default)]
    pub material_overrides: BTreeMap<PolygonTag, MaterialId>,
    /// Zero the displacement field at phase start (stress is kept)
    #[serde(default)]
    pub reset_displacements: bool,
}

impl Phase {
    /// Create a phase with empty active sets
    pub fn new(id: PhaseId, name: &str, kind: PhaseKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            parent: None,
            active_polygons: BTreeSet::new(),
            active_loads: BTreeSet::new(),
            water_level: None,
            material_overrides: BTreeMap::new(),
            reset_displacements: false,
        }
    }

    /// Set the parent phase
    pub fn with_parent(mut self, parent: PhaseId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Activate polygons
    pub fn with_polygons<I: IntoIterator<Item = PolygonTag>>(mut self, tags: I) -> Self {
        self.active_polygons.extend(tags);
        self
    }

    /// Activate loads
    pub fn with_loads<I: IntoIterator<Item = LoadId>>(mut self, loads: I) -> Self {
        self.active_loads.extend(loads);
        self
    }

    /// Set the water level
    pub fn with_water_level(mut self, wl: WaterLevelId) -> Self {
        self.water_level = Some(wl);
        self
    }
}

/// The phase tree, stored as an arena in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseTree {
    phases: Vec<Phase>,
}

impl PhaseTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a phase. SafetyAnalysis phases have their active sets locked to
    /// the parent's at insertion time.
    pub fn push(&mut self, mut phase: Phase) -> Result<PhaseId, String> {
        if self.phases.iter().any(|p| p.id == phase.id) {
            return Err(format!("duplicate phase identity {}", phase.id));
        }
        if let Some(parent_id) = phase.parent {
            let parent = self
                .get(parent_id)
                .ok_or_else(|| format!("phase {} references unknown parent {}", phase.id, parent_id))?;
            if phase.kind == PhaseKind::SafetyAnalysis {
                // Safety phases inherit the parent's configuration verbatim.
                phase.active_polygons = parent.active_polygons.clone();
                phase.active_loads = parent.active_loads.clone();
                phase.water_level = parent.water_level;
                phase.material_overrides.clear();
            }
        }
        let id = phase.id;
        self.phases.push(phase);
        Ok(id)
    }

    /// Look up a phase by identity
    pub fn get(&self, id: PhaseId) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    /// Number of phases
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Whether the tree is empty
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// All phases in arena order
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Children of a phase (or branch roots for `None`), in arena order
    pub fn children(&self, parent: Option<PhaseId>) -> Vec<&Phase> {
        self.phases.iter().filter(|p| p.parent == parent).collect()
    }

    /// Execution order: depth-first over the tree, roots in arena order.
    pub fn execution_order(&self) -> Vec<PhaseId> {
        let mut order = Vec::with_capacity(self.phases.len());
        let mut stack: Vec<PhaseId> = self
            .children(None)
            .iter()
            .rev()
            .map(|p| p.id)
            .collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            for child in self.children(Some(id)).iter().rev() {
                stack.push(child.id);
            }
        }
        order
    }

    /// Validate the tree: resolvable acyclic parentage, initial-stress
    /// phases only as branch roots and at most one per branch, material
    /// overrides restricted to K0 and Plastic phases, safety phases locked
    /// to their parent's active sets.
    pub fn validate(&self) -> Result<(), String> {
        let by_id: HashMap<PhaseId, &Phase> = self.phases.iter().map(|p| (p.id, p)).collect();
        if by_id.len() != self.phases.len() {
            return Err("duplicate phase identities in tree".to_string());
        }

        for phase in &self.phases {
            // Walk to the root, detecting cycles by bounded depth.
            let mut current = phase.parent;
            let mut hops = 0usize;
            while let Some(parent_id) = current {
                let parent = by_id
                    .get(&parent_id)
                    .ok_or_else(|| format!("phase {} references unknown parent {}", phase.id, parent_id))?;
                hops += 1;
                if hops > self.phases.len() {
                    return Err(format!("phase parent relation contains a cycle at {}", phase.id));
                }
                if parent.kind.is_initial() && parent.parent.is_some() {
                    return Err(format!(
                        "initial-stress phase {} must be a branch root",
                        parent.id
                    ));
                }
                current = parent.parent;
            }

            if phase.kind.is_initial() && phase.parent.is_some() {
                return Err(format!(
                    "initial-stress phase {} must be a branch root",
                    phase.id
                ));
            }

            if !phase.material_overrides.is_empty()
                && !matches!(phase.kind, PhaseKind::K0Procedure | PhaseKind::Plastic)
            {
                return Err(format!(
                    "phase {}: material overrides are only valid for K0 and Plastic phases",
                    phase.id
                ));
            }

            if phase.kind == PhaseKind::SafetyAnalysis {
                let parent_id = phase.parent.ok_or_else(|| {
                    format!("safety phase {} requires a parent phase", phase.id)
                })?;
                let parent = by_id[&parent_id];
                if phase.active_polygons != parent.active_polygons
                    || phase.active_loads != parent.active_loads
                    || phase.water_level != parent.water_level
                {
                    return Err(format!(
                        "safety phase {} must inherit the active sets of its parent verbatim",
                        phase.id
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(raw: u32) -> PolygonTag {
        PolygonTag(raw)
    }

    fn build_branch() -> PhaseTree {
        let mut tree = PhaseTree::new();
        tree.push(
            Phase::new(PhaseId(0), "initial", PhaseKind::K0Procedure).with_polygons([tag(0)]),
        )
        .unwrap();
        tree.push(
            Phase::new(PhaseId(1), "fill", PhaseKind::Plastic)
                .with_parent(PhaseId(0))
                .with_polygons([tag(0), tag(1)]),
        )
        .unwrap();
        tree.push(
            Phase::new(PhaseId(2), "safety", PhaseKind::SafetyAnalysis).with_parent(PhaseId(1)),
        )
        .unwrap();
        tree
    }

    #[test]
    fn valid_branch_passes() {
        let tree = build_branch();
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn safety_phase_inherits_parent_sets() {
        let tree = build_branch();
        let safety = tree.get(PhaseId(2)).unwrap();
        assert_eq!(safety.active_polygons, tree.get(PhaseId(1)).unwrap().active_polygons);
    }

    #[test]
    fn rejects_duplicate_identity() {
        let mut tree = build_branch();
        let err = tree
            .push(Phase::new(PhaseId(0), "again", PhaseKind::Plastic))
            .unwrap_err();
        assert!(err.contains("duplicate phase identity"));
    }

    #[test]
    fn rejects_initial_phase_with_parent() {
        let mut tree = build_branch();
        let mut gravity = Phase::new(PhaseId(3), "gravity", PhaseKind::GravityLoading);
        gravity.parent = Some(PhaseId(1));
        tree.phases.push(gravity);
        let err = tree.validate().unwrap_err();
        assert!(err.contains("branch root"));
    }

    #[test]
    fn rejects_overrides_on_safety() {
        let mut tree = build_branch();
        // Tamper with a safety phase after insertion.
        let idx = tree.phases.iter().position(|p| p.id == PhaseId(2)).unwrap();
        tree.phases[idx]
            .material_overrides
            .insert(tag(0), MaterialId(1));
        let err = tree.validate().unwrap_err();
        assert!(err.contains("material overrides"));
    }

    #[test]
    fn rejects_cycles() {
        let mut tree = build_branch();
        let idx = tree.phases.iter().position(|p| p.id == PhaseId(1)).unwrap();
        tree.phases[idx].parent = Some(PhaseId(2));
        assert!(tree.validate().is_err());
    }

    #[test]
    fn execution_order_is_depth_first() {
        let mut tree = build_branch();
        tree.push(
            Phase::new(PhaseId(3), "alt", PhaseKind::Plastic)
                .with_parent(PhaseId(0))
                .with_polygons([tag(0)]),
        )
        .unwrap();
        let order = tree.execution_order();
        assert_eq!(
            order,
            vec![PhaseId(0), PhaseId(1), PhaseId(2), PhaseId(3)]
        );
    }
}
