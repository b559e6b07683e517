//! Default implementations of [crate::store::Datastore]

pub mod file;
pub mod memory;
