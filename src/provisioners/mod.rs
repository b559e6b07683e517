//! Default implementations of [crate::provisioner::Provisioner]

#[cfg(feature = "http")]
pub mod http;
