//! # Inventory entities: apartments and floor groups.
//!
//! [`ApartmentRecord`] is the load-time shape (explicit 1-based light
//! indexes, validated for contiguity); [`Apartment`] is the stored shape
//! (addresses ordered by index, contiguity structural). Floor groups
//! aggregate the apartments of one floor of one tower; membership is a
//! foreign reference from the apartment side.

use serde::{Deserialize, Serialize};

use crate::codec::Addr;
use crate::inventory::LightState;

/// One fixture association as it arrives from the inventory import.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LightRef {
    /// 1-based light index within the apartment.
    pub index: u16,
    /// Bus address of the fixture.
    pub addr: Addr,
}

/// Load-time apartment record, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApartmentRecord {
    /// Stable identifier ("A-0901").
    pub id: String,
    /// Floor number within the tower.
    pub floor: i32,
    /// Floor group this apartment belongs to.
    pub group_id: String,
    /// Position of the unit on its floor.
    pub unit_position: u16,
    /// Fixture associations, any order; indexes must be contiguous from 1.
    pub lights: Vec<LightRef>,
}

/// A validated apartment as stored in the inventory.
#[derive(Debug, Clone, Serialize)]
pub struct Apartment {
    /// Stable identifier.
    pub id: String,
    /// Floor number within the tower.
    pub floor: i32,
    /// Owning floor group.
    pub group_id: String,
    /// Position of the unit on its floor.
    pub unit_position: u16,
    /// Fixture addresses ordered by light index (slot 0 = index 1).
    pub lights: Vec<Addr>,
    /// Persisted sales state; updated when a light request succeeds.
    pub state: LightState,
}

impl Apartment {
    /// Primary address: the lowest-indexed light, if any.
    pub fn primary_addr(&self) -> Option<Addr> {
        self.lights.first().copied()
    }

    /// True when the apartment cannot be lit.
    pub fn is_unlit_shell(&self) -> bool {
        self.lights.is_empty()
    }
}

/// A floor of a tower, aggregating its apartments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorGroup {
    /// Stable identifier ("T1-F09").
    pub id: String,
    /// Tower the floor belongs to.
    pub tower: String,
    /// Floor number.
    pub floor: i32,
}
