//! Domain modules organized as vertical slices.
//!
//! Each sub-module contains:
//! - `mod.rs` — Rich domain types (validated, business-logic-ready)
//! - `wire.rs` — Raw serde structs matching the feed's payloads
//! - `convert.rs` — `TryFrom` conversions with validation
//! - `state.rs` — State containers updated by the tick path

pub mod price;
