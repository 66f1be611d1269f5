//! Security related protections

pub mod replay;
