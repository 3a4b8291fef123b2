//! # The inventory store: indexed reads, administrative writes.
//!
//! [`Inventory`] owns the apartment and floor-group tables plus the per-state
//! color palette. Request processing only reads; loading and the admin
//! operations mutate. Joins the core needs are expressed as indexed reads:
//!
//! ```text
//! apartment(id)            → Apartment
//! addresses_of(id)         → [Addr] ordered by light index
//! group_members(group_id)  → [Apartment] ordered by unit position
//! floor_members(floor)     → [Apartment]
//! floors_descending()      → distinct floors, highest first
//! ```
//!
//! ## Rules
//! - Light indexes must be contiguous from 1 (checked at load, then
//!   structural).
//! - Apartments must reference an existing group (foreign ref).
//! - `set_state` is the only mutation on the request path; it marks the
//!   persisted sales state after a successful light operation.

use std::collections::HashSet;

use dashmap::DashMap;
use thiserror::Error;

use crate::codec::Addr;
use crate::inventory::{
    Apartment, ApartmentRecord, FloorGroup, LightState, StateStyle,
};

/// Errors raised while loading or mutating inventory tables.
///
/// These abort startup; they never occur on the request path.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Two apartment records share an identifier.
    #[error("duplicate apartment '{id}'")]
    DuplicateApartment {
        /// The repeated identifier.
        id: String,
    },

    /// An apartment references a group that was not loaded.
    #[error("apartment '{id}' references unknown group '{group_id}'")]
    UnknownGroup {
        /// The apartment identifier.
        id: String,
        /// The missing group identifier.
        group_id: String,
    },

    /// Light indexes are not contiguous from 1.
    #[error("apartment '{id}' light indexes are not contiguous from 1")]
    NonContiguousLights {
        /// The apartment identifier.
        id: String,
    },
}

/// Read-mostly inventory tables with indexed joins.
#[derive(Debug, Default)]
pub struct Inventory {
    apartments: DashMap<String, Apartment>,
    groups: DashMap<String, FloorGroup>,
    palette: DashMap<LightState, StateStyle>,
}

impl Inventory {
    /// Creates an empty inventory with the default state palette.
    pub fn new() -> Self {
        let inv = Self::default();
        for state in LightState::ALL {
            inv.palette.insert(state, state.default_style());
        }
        inv
    }

    /// Loads groups and apartment records, validating referential integrity
    /// and light-index contiguity.
    pub fn load(
        &self,
        groups: Vec<FloorGroup>,
        records: Vec<ApartmentRecord>,
    ) -> Result<(), InventoryError> {
        for g in groups {
            self.groups.insert(g.id.clone(), g);
        }
        for rec in records {
            self.insert_apartment(rec)?;
        }
        Ok(())
    }

    /// Admin: inserts one apartment record after validation.
    pub fn insert_apartment(&self, rec: ApartmentRecord) -> Result<(), InventoryError> {
        if self.apartments.contains_key(&rec.id) {
            return Err(InventoryError::DuplicateApartment { id: rec.id });
        }
        if !self.groups.contains_key(&rec.group_id) {
            return Err(InventoryError::UnknownGroup {
                id: rec.id,
                group_id: rec.group_id,
            });
        }

        let mut lights = rec.lights;
        lights.sort_by_key(|l| l.index);
        let contiguous = lights
            .iter()
            .enumerate()
            .all(|(slot, l)| usize::from(l.index) == slot + 1);
        if !contiguous {
            return Err(InventoryError::NonContiguousLights { id: rec.id });
        }

        let apartment = Apartment {
            id: rec.id.clone(),
            floor: rec.floor,
            group_id: rec.group_id,
            unit_position: rec.unit_position,
            lights: lights.into_iter().map(|l| l.addr).collect(),
            state: LightState::Off,
        };
        self.apartments.insert(rec.id, apartment);
        Ok(())
    }

    /// Admin: removes an apartment. Returns whether it existed.
    pub fn remove_apartment(&self, id: &str) -> bool {
        self.apartments.remove(id).is_some()
    }

    /// Looks up one apartment by id.
    pub fn apartment(&self, id: &str) -> Option<Apartment> {
        self.apartments.get(id).map(|a| a.clone())
    }

    /// Looks up one floor group by id.
    pub fn group(&self, id: &str) -> Option<FloorGroup> {
        self.groups.get(id).map(|g| g.clone())
    }

    /// Fixture addresses of an apartment, ordered by light index.
    pub fn addresses_of(&self, id: &str) -> Option<Vec<Addr>> {
        self.apartments.get(id).map(|a| a.lights.clone())
    }

    /// Apartments of a floor group, ordered by unit position.
    pub fn group_members(&self, group_id: &str) -> Vec<Apartment> {
        let mut members: Vec<Apartment> = self
            .apartments
            .iter()
            .filter(|a| a.group_id == group_id)
            .map(|a| a.clone())
            .collect();
        members.sort_by_key(|a| a.unit_position);
        members
    }

    /// Apartments on a floor (across groups of the floor).
    pub fn floor_members(&self, floor: i32) -> Vec<Apartment> {
        let mut members: Vec<Apartment> = self
            .apartments
            .iter()
            .filter(|a| a.floor == floor)
            .map(|a| a.clone())
            .collect();
        members.sort_by_key(|a| a.unit_position);
        members
    }

    /// Distinct populated floors, highest first.
    ///
    /// The login fade-down walks this order.
    pub fn floors_descending(&self) -> Vec<i32> {
        let floors: HashSet<i32> = self.apartments.iter().map(|a| a.floor).collect();
        let mut floors: Vec<i32> = floors.into_iter().collect();
        floors.sort_unstable_by(|a, b| b.cmp(a));
        floors
    }

    /// Every apartment, ordered by (floor, unit position).
    ///
    /// The chase sequence runs over this flat order.
    pub fn apartments_ordered(&self) -> Vec<Apartment> {
        let mut all: Vec<Apartment> = self.apartments.iter().map(|a| a.clone()).collect();
        all.sort_by_key(|a| (a.floor, a.unit_position));
        all
    }

    /// Every known fixture address, deduplicated, ascending.
    pub fn all_addresses(&self) -> Vec<Addr> {
        let set: HashSet<Addr> = self
            .apartments
            .iter()
            .flat_map(|a| a.lights.clone())
            .collect();
        let mut addrs: Vec<Addr> = set.into_iter().collect();
        addrs.sort_unstable();
        addrs
    }

    /// Marks the persisted sales state of an apartment.
    pub fn set_state(&self, id: &str, state: LightState) {
        if let Some(mut a) = self.apartments.get_mut(id) {
            a.state = state;
        }
    }

    /// Style (color + default intensity) for a state.
    pub fn style_for(&self, state: LightState) -> StateStyle {
        self.palette
            .get(&state)
            .map(|s| *s)
            .unwrap_or_else(|| state.default_style())
    }

    /// Admin: overrides the style of one state.
    pub fn set_style(&self, state: LightState, style: StateStyle) {
        self.palette.insert(state, style);
    }

    /// Number of loaded apartments.
    pub fn apartment_count(&self) -> usize {
        self.apartments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::LightRef;

    fn record(id: &str, floor: i32, group: &str, pos: u16, addrs: &[u16]) -> ApartmentRecord {
        ApartmentRecord {
            id: id.to_string(),
            floor,
            group_id: group.to_string(),
            unit_position: pos,
            lights: addrs
                .iter()
                .enumerate()
                .map(|(i, &a)| LightRef {
                    index: (i + 1) as u16,
                    addr: Addr(a),
                })
                .collect(),
        }
    }

    fn group(id: &str, floor: i32) -> FloorGroup {
        FloorGroup {
            id: id.to_string(),
            tower: "T1".to_string(),
            floor,
        }
    }

    #[test]
    fn load_validates_group_references() {
        let inv = Inventory::new();
        let err = inv
            .load(vec![], vec![record("A-0901", 9, "T1-F09", 1, &[10])])
            .unwrap_err();
        assert!(matches!(err, InventoryError::UnknownGroup { .. }));
    }

    #[test]
    fn load_rejects_gapped_light_indexes() {
        let inv = Inventory::new();
        inv.load(vec![group("T1-F09", 9)], vec![]).unwrap();
        let rec = ApartmentRecord {
            id: "A-0901".to_string(),
            floor: 9,
            group_id: "T1-F09".to_string(),
            unit_position: 1,
            lights: vec![
                LightRef {
                    index: 1,
                    addr: Addr(10),
                },
                LightRef {
                    index: 3,
                    addr: Addr(11),
                },
            ],
        };
        assert!(matches!(
            inv.insert_apartment(rec),
            Err(InventoryError::NonContiguousLights { .. })
        ));
    }

    #[test]
    fn addresses_keep_light_index_order() {
        let inv = Inventory::new();
        inv.load(vec![group("T1-F09", 9)], vec![]).unwrap();
        let rec = ApartmentRecord {
            id: "A-0901".to_string(),
            floor: 9,
            group_id: "T1-F09".to_string(),
            unit_position: 1,
            lights: vec![
                LightRef {
                    index: 2,
                    addr: Addr(20),
                },
                LightRef {
                    index: 1,
                    addr: Addr(10),
                },
            ],
        };
        inv.insert_apartment(rec).unwrap();
        assert_eq!(inv.addresses_of("A-0901").unwrap(), vec![Addr(10), Addr(20)]);
        assert_eq!(inv.apartment("A-0901").unwrap().primary_addr(), Some(Addr(10)));
    }

    #[test]
    fn floors_come_out_highest_first() {
        let inv = Inventory::new();
        inv.load(
            vec![group("T1-F09", 9), group("T1-F10", 10)],
            vec![
                record("A-0901", 9, "T1-F09", 1, &[10]),
                record("A-1001", 10, "T1-F10", 1, &[20]),
                record("A-1002", 10, "T1-F10", 2, &[21]),
            ],
        )
        .unwrap();
        assert_eq!(inv.floors_descending(), vec![10, 9]);
        assert_eq!(inv.group_members("T1-F10").len(), 2);
        assert_eq!(inv.floor_members(9).len(), 1);
    }

    #[test]
    fn persisted_state_is_marked_in_place() {
        let inv = Inventory::new();
        inv.load(
            vec![group("T1-F09", 9)],
            vec![record("A-0901", 9, "T1-F09", 1, &[10])],
        )
        .unwrap();
        assert_eq!(inv.apartment("A-0901").unwrap().state, LightState::Off);
        inv.set_state("A-0901", LightState::Sold);
        assert_eq!(inv.apartment("A-0901").unwrap().state, LightState::Sold);
    }
}
