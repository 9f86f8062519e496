/*
 * Copyright 2023 Oxide Computer Company
 */

use crate::error::{PlanError, PlanResult};

/**
 * Number of sectors in one megabyte.  Partition geometry is only ever
 * computed for disks with 512 byte sectors.
 */
pub const BLOCKS_TO_MB: u64 = 2048;
pub const GB_TO_MB: u64 = 1024;
pub const TB_TO_GB: u64 = 1024;

pub fn mb_to_sectors(mb: u64) -> u64 {
    mb.saturating_mul(BLOCKS_TO_MB)
}

/**
 * Convert a sector count to whole megabytes.  This truncates, so a size that
 * has been clamped to a sector boundary always converts back to a megabyte
 * count that does not exceed it.
 */
pub fn sectors_to_mb(sectors: u64) -> u64 {
    sectors / BLOCKS_TO_MB
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Sectors,
    Megabytes,
    Gigabytes,
    Terabytes,
}

impl SizeUnit {
    fn from_suffix(suffix: &str) -> Option<SizeUnit> {
        /*
         * A bare number is a size in megabytes, which is what the manifest
         * has always assumed.
         */
        Some(match suffix.to_ascii_lowercase().as_str() {
            "" | "m" | "mb" | "mib" => SizeUnit::Megabytes,
            "s" | "sec" | "sectors" => SizeUnit::Sectors,
            "g" | "gb" | "gib" => SizeUnit::Gigabytes,
            "t" | "tb" | "tib" => SizeUnit::Terabytes,
            _ => return None,
        })
    }

    pub fn to_mb(self, value: u64) -> Option<u64> {
        match self {
            SizeUnit::Sectors => Some(sectors_to_mb(value)),
            SizeUnit::Megabytes => Some(value),
            SizeUnit::Gigabytes => value.checked_mul(GB_TO_MB),
            SizeUnit::Terabytes => value.checked_mul(TB_TO_GB * GB_TO_MB),
        }
    }
}

/**
 * Parse a size such as "5000", "20g" or "4096s" into megabytes.
 */
pub fn parse_size_mb(input: &str) -> PlanResult<u64> {
    let bad = || PlanError::InvalidSize(input.to_string());

    let s = input.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);
    if digits.is_empty() {
        return Err(bad());
    }

    let value: u64 = digits.parse().map_err(|_| bad())?;
    let unit = SizeUnit::from_suffix(suffix.trim()).ok_or_else(bad)?;
    unit.to_mb(value).ok_or_else(bad)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sizes_with_units() {
        assert_eq!(parse_size_mb("5000").unwrap(), 5000);
        assert_eq!(parse_size_mb("5000mb").unwrap(), 5000);
        assert_eq!(parse_size_mb(" 20G ").unwrap(), 20 * 1024);
        assert_eq!(parse_size_mb("1t").unwrap(), 1024 * 1024);
        assert_eq!(parse_size_mb("4096s").unwrap(), 2);
        assert_eq!(parse_size_mb("4095 s").unwrap(), 1);
    }

    #[test]
    fn bad_sizes() {
        for input in ["", "mb", "12x", "-5", "1.5g", "99999999999999999999t"] {
            assert_eq!(
                parse_size_mb(input),
                Err(PlanError::InvalidSize(input.to_string())),
                "input {:?}",
                input
            );
        }
    }

    #[test]
    fn conversion_truncates() {
        assert_eq!(mb_to_sectors(3), 6144);
        assert_eq!(sectors_to_mb(6144), 3);
        assert_eq!(sectors_to_mb(6143), 2);
        assert_eq!(sectors_to_mb(mb_to_sectors(4996)), 4996);
    }
}
