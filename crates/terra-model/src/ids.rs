//! Newtype identities for model entities.
//!
//! All identities are stable small integers assigned by the mesher or the
//! project editor; the solver treats them as opaque keys.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(
    /// Identity of a mesh node.
    NodeId
);
id_type!(
    /// Identity of a six-node triangle element.
    ElementId
);
id_type!(
    /// Identity of a material definition.
    MaterialId
);
id_type!(
    /// Identity of a water level (phreatic polyline).
    WaterLevelId
);
id_type!(
    /// Identity of a point or line load.
    LoadId
);
id_type!(
    /// Identity of a phase in the phase tree.
    PhaseId
);
id_type!(
    /// Tag linking elements back to the drawing polygon they were meshed
    /// from; phases activate elements and override materials per tag.
    PolygonTag
);
