//! Network-number codec.
//!
//! Mesh routers live in `10.69.0.0/16` and encode their human-facing network
//! number in the last two octets: `10.69.T.F` maps to `100 * T + F`, with
//! fourth octets of 100+ and 200+ denoting the second and third router at the
//! same number. Addresses outside the scheme are not an error for callers,
//! just "no label available".

use crate::error::{Error, Result};

/// Address of the first router at a given network number.
pub fn ip_from_nn(nn: u32) -> String {
    format!("10.69.{}.{}", nn / 100, nn % 100)
}

fn mesh_octets(ip: &str) -> Result<(u32, u32)> {
    let invalid = || Error::InvalidAddress(ip.to_string());

    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 || parts[0] != "10" || parts[1] != "69" {
        return Err(invalid());
    }

    let third: u32 = parts[2].parse().map_err(|_| invalid())?;
    let fourth: u32 = parts[3].parse().map_err(|_| invalid())?;

    if third > 100 {
        return Err(invalid());
    }

    Ok((third, fourth))
}

/// Network number of a router address, collapsing the per-number router
/// index (fourth octets above 100 wrap back into 1..=100).
pub fn nn_from_ip(ip: &str) -> Result<u32> {
    let (third, mut fourth) = mesh_octets(ip)?;

    while fourth > 100 {
        fourth -= 100;
    }

    Ok(100 * third + fourth)
}

/// Display form of the network number, with a ` (.Nxx)` suffix for the
/// second and later routers at the same number.
pub fn nn_string_from_ip(ip: &str) -> Result<String> {
    let (third, mut fourth) = mesh_octets(ip)?;

    let router_idx = fourth / 100;
    while fourth >= 100 {
        fourth -= 100;
    }

    let nn = 100 * third + fourth;
    if router_idx > 0 {
        Ok(format!("{nn} (.{router_idx}xx)"))
    } else {
        Ok(nn.to_string())
    }
}
