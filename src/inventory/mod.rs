//! Inventory: read-mostly tables keyed by logical identifiers.
//!
//! The core joins these tables to turn logical requests (apartment, floor
//! group) into fixture addresses. Tables are loaded at startup and mutated
//! only by administrative operations; request processing reads them through
//! [`Inventory`]'s narrow interface.
//!
//! ## Contents
//! - [`state`] — the closed [`LightState`] set and its color palette
//! - [`model`] — [`Apartment`], [`FloorGroup`], load-time records
//! - [`store`] — [`Inventory`]: indexed joins and admin mutation
//!
//! ## Rules
//! - Every apartment's light index set is contiguous from 1 (enforced at load).
//! - Apartments reference an existing floor group (foreign ref, enforced).
//! - The primary address is the lowest-indexed light.

pub mod model;
pub mod state;
pub mod store;

pub use model::{Apartment, ApartmentRecord, FloorGroup, LightRef};
pub use state::{Color, LightState, StateStyle};
pub use store::{Inventory, InventoryError};
