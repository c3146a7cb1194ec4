// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::io::BufRead;
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

/// Resolves an address to a country code.
pub trait GeoLookup: Send + Sync {
    fn country(&self, ip: IpAddr) -> Option<String>;
}

impl GeoLookup for HashMap<IpAddr, String> {
    fn country(&self, ip: IpAddr) -> Option<String> {
        self.get(&ip).cloned()
    }
}

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to read geo database: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid geo database entry on line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Debug, Clone)]
struct Network {
    bits: u128,
    prefix: u8,
    v4: bool,
    country: String,
}

fn addr_bits(ip: IpAddr) -> (u128, bool) {
    match ip {
        IpAddr::V4(v4) => (u32::from(v4) as u128, true),
        IpAddr::V6(v6) => (u128::from(v6), false),
    }
}

fn mask(prefix: u8, v4: bool) -> u128 {
    let width = if v4 { 32 } else { 128 };
    if prefix == 0 {
        return 0;
    }
    let ones = u128::MAX >> (128 - prefix as u32);
    ones << (width - prefix as u32)
}

/// A lookup table of `network/prefix,country` lines. The most specific
/// matching network wins. Blank lines and `#` comments are skipped.
#[derive(Debug, Clone, Default)]
pub struct CidrGeoLookup {
    networks: Vec<Network>,
}

impl CidrGeoLookup {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GeoError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self, GeoError> {
        let mut networks = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_err = |reason: &str| GeoError::Parse {
                line: n + 1,
                reason: reason.to_string(),
            };

            let (cidr, country) = line
                .split_once(',')
                .ok_or_else(|| parse_err("expected <network>,<country>"))?;
            let (addr, prefix) = match cidr.trim().split_once('/') {
                Some((addr, prefix)) => (addr, Some(prefix)),
                None => (cidr.trim(), None),
            };
            let addr: IpAddr = addr.parse().map_err(|_| parse_err("invalid address"))?;
            let (bits, v4) = addr_bits(addr);
            let width = if v4 { 32 } else { 128 };
            let prefix = match prefix {
                Some(p) => p
                    .parse::<u8>()
                    .ok()
                    .filter(|p| *p as u32 <= width)
                    .ok_or_else(|| parse_err("invalid prefix length"))?,
                None => width as u8,
            };

            networks.push(Network {
                bits: bits & mask(prefix, v4),
                prefix,
                v4,
                country: country.trim().to_string(),
            });
        }
        Ok(Self { networks })
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl GeoLookup for CidrGeoLookup {
    fn country(&self, ip: IpAddr) -> Option<String> {
        let (bits, v4) = addr_bits(ip);
        self.networks
            .iter()
            .filter(|n| n.v4 == v4 && bits & mask(n.prefix, v4) == n.bits)
            .max_by_key(|n| n.prefix)
            .map(|n| n.country.clone())
    }
}
