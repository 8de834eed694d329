//! Transport-specific physical addresses of bridged devices.
//!
//! Textual forms:
//! - `aa:bb:cc:dd:ee:ff`: 6-byte MAC (ESP-NOW, BLE)
//! - `zb:0x1234/1`: Zigbee short address + endpoint
//! - `mesh:0x0042`: BLE-Mesh unicast address
//! - `virt:7`: virtual device created from the console

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhysicalAddress {
    Mac { mac: [u8; 6] },
    Zigbee { short_addr: u16, endpoint: u8 },
    BleMesh { addr: u16 },
    Virtual { id: u32 },
}

impl PhysicalAddress {
    pub const fn mac(mac: [u8; 6]) -> Self {
        Self::Mac { mac }
    }

    pub const fn zigbee(short_addr: u16, endpoint: u8) -> Self {
        Self::Zigbee {
            short_addr,
            endpoint,
        }
    }

    pub const fn ble_mesh(addr: u16) -> Self {
        Self::BleMesh { addr }
    }

    pub const fn virtual_device(id: u32) -> Self {
        Self::Virtual { id }
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mac { mac } => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            Self::Zigbee {
                short_addr,
                endpoint,
            } => write!(f, "zb:0x{:04x}/{}", short_addr, endpoint),
            Self::BleMesh { addr } => write!(f, "mesh:0x{:04x}", addr),
            Self::Virtual { id } => write!(f, "virt:{}", id),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal unsigned number.
pub fn parse_number<T>(text: &str) -> Option<T>
where
    T: TryFrom<u64>,
{
    let text = text.trim();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) if hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u64::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None if text.bytes().all(|b| b.is_ascii_digit()) => text.parse::<u64>().ok()?,
        None => return None,
    };
    T::try_from(value).ok()
}

fn invalid(text: &str) -> BridgeError {
    BridgeError::InvalidArgument(format!("malformed physical address '{}'", text))
}

impl FromStr for PhysicalAddress {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if let Some(rest) = text.strip_prefix("zb:") {
            let (short_addr, endpoint) = rest.split_once('/').ok_or_else(|| invalid(text))?;
            let short_addr = parse_number(short_addr).ok_or_else(|| invalid(text))?;
            let endpoint = parse_number(endpoint).ok_or_else(|| invalid(text))?;
            return Ok(Self::zigbee(short_addr, endpoint));
        }
        if let Some(rest) = text.strip_prefix("mesh:") {
            let addr = parse_number(rest).ok_or_else(|| invalid(text))?;
            return Ok(Self::ble_mesh(addr));
        }
        if let Some(rest) = text.strip_prefix("virt:") {
            let id = parse_number(rest).ok_or_else(|| invalid(text))?;
            return Ok(Self::virtual_device(id));
        }

        let octets: Vec<&str> = text.split(':').collect();
        if octets.len() != 6 {
            return Err(invalid(text));
        }
        let mut mac = [0u8; 6];
        for (byte, octet) in mac.iter_mut().zip(octets) {
            if octet.len() != 2 || !octet.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid(text));
            }
            *byte = u8::from_str_radix(octet, 16).map_err(|_| invalid(text))?;
        }
        Ok(Self::mac(mac))
    }
}
