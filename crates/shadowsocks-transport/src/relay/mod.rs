//! Relay transports

pub mod udprelay;
