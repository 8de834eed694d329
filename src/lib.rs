//! Matter device bridge library.
//!
//! Registry and lifecycle manager for non-Matter devices (Zigbee, BLE Mesh,
//! ESP-NOW, virtual) exposed as dynamic endpoints on a Matter bridge node.

pub mod bridge;
pub mod config;
pub mod console;
pub mod error;
pub mod matter;

#[cfg(test)]
pub(crate) mod testing;
