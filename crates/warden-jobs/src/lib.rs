//! Job manifest model and the translation of processes into installable
//! service descriptors.

pub mod descriptor;
pub mod manifest;

pub use descriptor::*;
pub use manifest::*;
