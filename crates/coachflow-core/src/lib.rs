//! Coachflow Core - State record, entity focus, field naming, and errors

pub mod error;
pub mod fields;
pub mod focus;
pub mod protocol;
pub mod state;
pub mod types;

pub use error::{Error, Result};
pub use fields::{EntityFields, EntityView, FieldNamer};
pub use focus::Focus;
pub use protocol::*;
pub use state::{StatePatch, StateRecord};
pub use types::*;
