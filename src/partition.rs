/*
 * Copyright 2023 Oxide Computer Company
 */

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::units::{mb_to_sectors, parse_size_mb, sectors_to_mb};

/// Number of primary fdisk partition slots.
pub const NUMPART: usize = 4;

/*
 * fdisk(8) system ids.  Both 0 and UNUSED mark an empty slot.
 */
pub const UNUSED: u8 = 100;
pub const DOSOS16: u8 = 0x04;
pub const EXTDOS: u8 = 0x05;
pub const FDISK_WINDOWS: u8 = 0x0B;
pub const FDISK_EXTLBA: u8 = 0x0F;
pub const SUNIXOS2: u8 = 0xBF;

/**
 * The type of an fdisk partition slot.  The two historical "empty" system ids
 * are folded into the single Unused variant; a code of 0 or 100 wrapped in
 * Used is treated as Unused everywhere.
 */
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(try_from = "TypeSpec", into = "u8")]
pub enum PartitionType {
    #[default]
    Unused,
    Used(u8),
}

impl PartitionType {
    pub fn is_unused(self) -> bool {
        matches!(self, PartitionType::Unused)
            || matches!(self, PartitionType::Used(0 | UNUSED))
    }

    pub fn is_solaris(self) -> bool {
        matches!(self, PartitionType::Used(SUNIXOS2))
    }

    pub fn code(self) -> u8 {
        u8::from(self)
    }

    fn name(self) -> Option<&'static str> {
        if self.is_unused() {
            return Some("UNUSED");
        }
        match self.code() {
            SUNIXOS2 => Some("SOLARIS"),
            DOSOS16 => Some("DOS16"),
            FDISK_WINDOWS => Some("FAT32"),
            EXTDOS => Some("DOSEXT"),
            FDISK_EXTLBA => Some("DOSEXTLBA"),
            _ => None,
        }
    }
}

impl PartialEq for PartitionType {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for PartitionType {}

impl From<u8> for PartitionType {
    fn from(code: u8) -> Self {
        match code {
            0 | UNUSED => PartitionType::Unused,
            code => PartitionType::Used(code),
        }
    }
}

impl From<PartitionType> for u8 {
    fn from(ty: PartitionType) -> Self {
        match ty {
            PartitionType::Unused | PartitionType::Used(0) => UNUSED,
            PartitionType::Used(code) => code,
        }
    }
}

impl FromStr for PartitionType {
    type Err = PlanError;

    /**
     * Accept the common names used in install manifests, or a system id
     * written in decimal ("191") or hexadecimal ("0xbf").
     */
    fn from_str(s: &str) -> PlanResult<Self> {
        let t = s.trim();
        let code = match t.to_ascii_uppercase().as_str() {
            "SOLARIS" | "SOLARIS2" => SUNIXOS2,
            "DOS16" => DOSOS16,
            "FAT32" => FDISK_WINDOWS,
            "DOSEXT" => EXTDOS,
            "DOSEXTLBA" => FDISK_EXTLBA,
            "UNUSED" => UNUSED,
            u => {
                let parsed = if let Some(hex) = u.strip_prefix("0X") {
                    u8::from_str_radix(hex, 16)
                } else {
                    u.parse::<u8>()
                };
                parsed.map_err(|_| PlanError::InvalidType(s.to_string()))?
            }
        };
        Ok(PartitionType::from(code))
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(n) => write!(f, "{}", n),
            None => write!(f, "0x{:02X}", self.code()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TypeSpec {
    Code(u64),
    Name(String),
}

impl TryFrom<TypeSpec> for PartitionType {
    type Error = PlanError;

    fn try_from(spec: TypeSpec) -> PlanResult<Self> {
        match spec {
            TypeSpec::Code(c) => u8::try_from(c)
                .map(PartitionType::from)
                .map_err(|_| PlanError::InvalidType(c.to_string())),
            TypeSpec::Name(n) => n.parse(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeSpec {
    Megabytes(u64),
    Text(String),
}

fn deserialize_size_mb<'de, D>(d: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeSpec::deserialize(d)? {
        SizeSpec::Megabytes(mb) => Ok(mb),
        SizeSpec::Text(t) => parse_size_mb(&t).map_err(serde::de::Error::custom),
    }
}

/**
 * One fdisk partition slot.  The slot's position in the table is its
 * partition number; "id" is assigned by whoever built the table and is never
 * changed here.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSlot {
    #[serde(default)]
    pub id: u8,
    #[serde(rename = "type", default)]
    pub ty: PartitionType,
    #[serde(default, deserialize_with = "deserialize_size_mb")]
    pub size_mb: u64,
    #[serde(default)]
    pub size_sectors: u64,
    #[serde(default)]
    pub offset_sectors: u64,
}

impl PartitionSlot {
    #[cfg(test)]
    pub fn new(id: u8, ty: PartitionType, size_mb: u64) -> PartitionSlot {
        PartitionSlot { id, ty, size_mb, ..Default::default() }
    }

    /**
     * A slot is in use if it has a real type and a non-zero size.
     */
    pub fn is_used(&self) -> bool {
        !self.ty.is_unused() && self.size_mb != 0
    }

    pub fn end_sectors(&self) -> u64 {
        self.offset_sectors.saturating_add(self.size_sectors)
    }

    pub fn clear_geometry(&mut self) {
        self.offset_sectors = 0;
        self.size_sectors = 0;
    }

    pub fn set_sectors_from_mb(&mut self) {
        self.size_sectors = mb_to_sectors(self.size_mb);
    }

    pub fn set_mb_from_sectors(&mut self) {
        self.size_mb = sectors_to_mb(self.size_sectors);
    }
}

fn deserialize_slots<'de, D>(d: D) -> Result<[PartitionSlot; NUMPART], D::Error>
where
    D: Deserializer<'de>,
{
    /*
     * Plan documents may list fewer slots than the table holds; the rest are
     * left unused.
     */
    let list = Vec::<PartitionSlot>::deserialize(d)?;
    if list.len() > NUMPART {
        return Err(serde::de::Error::custom(format!(
            "{} partition slots listed, at most {} allowed",
            list.len(),
            NUMPART
        )));
    }

    let mut slots = [PartitionSlot::default(); NUMPART];
    slots[..list.len()].copy_from_slice(&list);
    Ok(slots)
}

/**
 * The fdisk partition table for a single disk.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTable {
    pub disk_name: String,
    #[serde(default, deserialize_with = "deserialize_slots")]
    pub slots: [PartitionSlot; NUMPART],
}

impl PartitionTable {
    pub fn new(disk_name: &str, slots: [PartitionSlot; NUMPART]) -> Self {
        PartitionTable { disk_name: disk_name.to_string(), slots }
    }

    /**
     * A table with every slot zeroed, used as the baseline for a disk that
     * does not yet carry an fdisk table.
     */
    pub fn empty(disk_name: &str) -> Self {
        PartitionTable::new(disk_name, [PartitionSlot::default(); NUMPART])
    }

    pub fn first_used(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_used())
    }

    pub fn next_used(&self, current: usize) -> Option<usize> {
        (current + 1..NUMPART).find(|&i| self.slots[i].is_used())
    }

    pub fn previous_used(&self, current: usize) -> Option<usize> {
        (0..current).rev().find(|&i| self.slots[i].is_used())
    }

    /**
     * Locate the first slot holding a Solaris2 partition, if there is one.
     */
    pub fn solaris_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.ty.is_solaris() && s.size_mb != 0)
    }

    /**
     * Render one line per slot in the format the installer has always used
     * for its partition LBA dumps.
     */
    pub fn dump(&self) -> Vec<String> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "[{}] pos={}, id={:02X}, beg={}, size={}({} MiB)",
                    i,
                    s.id,
                    s.ty.code(),
                    s.offset_sectors,
                    s.size_sectors,
                    s.size_mb
                )
            })
            .collect()
    }
}

impl fmt::Display for PartitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "disk {}:", self.disk_name)?;
        writeln!(
            f,
            "{:>4} {:>3} {:<10} {:>12} {:>12} {:>10}",
            "SLOT", "ID", "TYPE", "OFFSET", "SECTORS", "MB"
        )?;
        for (i, s) in self.slots.iter().enumerate() {
            writeln!(
                f,
                "{:>4} {:>3} {:<10} {:>12} {:>12} {:>10}",
                i,
                s.id,
                s.ty.to_string(),
                s.offset_sectors,
                s.size_sectors,
                s.size_mb
            )?;
        }
        Ok(())
    }
}

/**
 * Geometry of the disk a table belongs to.  The first cylinder is reserved
 * for boot use, so the first partition never starts before it.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskGeometry {
    pub size_sectors: u64,
    pub cylinder_sectors: u64,
}

impl DiskGeometry {
    pub fn validate(&self) -> PlanResult<()> {
        if self.size_sectors == 0 || self.cylinder_sectors == 0 {
            return Err(PlanError::InvalidInput(format!(
                "disk geometry must be non-zero (size {} sectors, \
                cylinder {} sectors)",
                self.size_sectors, self.cylinder_sectors
            )));
        }
        if self.cylinder_sectors >= self.size_sectors {
            return Err(PlanError::InvalidInput(format!(
                "cylinder size {} does not fit on a disk of {} sectors",
                self.cylinder_sectors, self.size_sectors
            )));
        }
        Ok(())
    }

    pub fn size_mb(&self) -> u64 {
        sectors_to_mb(self.size_sectors)
    }

    pub fn cylinder_mb(&self) -> u64 {
        sectors_to_mb(self.cylinder_sectors)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;

    fn solaris(id: u8, size_mb: u64) -> PartitionSlot {
        PartitionSlot::new(id, PartitionType::Used(SUNIXOS2), size_mb)
    }

    #[test]
    fn unused_sentinels() {
        assert_eq!(PartitionType::from(0), PartitionType::Unused);
        assert_eq!(PartitionType::from(100), PartitionType::Unused);
        assert_eq!(PartitionType::Used(0), PartitionType::Unused);
        assert!(PartitionType::Used(UNUSED).is_unused());
        assert_eq!(PartitionType::from(0xBF), PartitionType::Used(SUNIXOS2));
        assert_eq!(u8::from(PartitionType::Unused), UNUSED);
    }

    #[test]
    fn used_needs_type_and_size() {
        assert!(solaris(1, 10).is_used());
        assert!(!solaris(1, 0).is_used());
        assert!(!PartitionSlot::new(1, PartitionType::Unused, 10).is_used());
    }

    #[test]
    fn type_names() -> Result<()> {
        assert_eq!("solaris".parse::<PartitionType>()?.code(), SUNIXOS2);
        assert_eq!("FAT32".parse::<PartitionType>()?.code(), FDISK_WINDOWS);
        assert_eq!("DosExtLba".parse::<PartitionType>()?.code(), FDISK_EXTLBA);
        assert_eq!("191".parse::<PartitionType>()?.code(), SUNIXOS2);
        assert_eq!("0xbf".parse::<PartitionType>()?.code(), SUNIXOS2);
        assert!("unused".parse::<PartitionType>()?.is_unused());
        assert!("linux".parse::<PartitionType>().is_err());
        assert!("256".parse::<PartitionType>().is_err());
        assert_eq!(PartitionType::Used(0x83).to_string(), "0x83");
        assert_eq!(PartitionType::Used(SUNIXOS2).to_string(), "SOLARIS");
        Ok(())
    }

    #[test]
    fn used_neighbours() {
        let mut t = PartitionTable::empty("c0t0d0");
        t.slots[1] = solaris(2, 100);
        t.slots[3] = solaris(4, 100);

        assert_eq!(t.first_used(), Some(1));
        assert_eq!(t.next_used(1), Some(3));
        assert_eq!(t.next_used(3), None);
        assert_eq!(t.previous_used(3), Some(1));
        assert_eq!(t.previous_used(1), None);
        assert_eq!(t.solaris_slot(), Some(1));
        assert_eq!(PartitionTable::empty("c0t0d0").first_used(), None);
    }

    #[test]
    fn plan_document_with_names_and_units() -> Result<()> {
        let input = "disk_name = \"c1t0d0\"\n\
            [[slots]]\n\
            id = 1\n\
            type = \"solaris\"\n\
            size_mb = \"20g\"\n\
            [[slots]]\n\
            id = 2\n\
            type = 7\n\
            size_mb = 3000\n";
        let t: PartitionTable = toml::from_str(input)?;

        assert_eq!(t.disk_name, "c1t0d0");
        assert_eq!(t.slots[0].ty, PartitionType::Used(SUNIXOS2));
        assert_eq!(t.slots[0].size_mb, 20 * 1024);
        assert_eq!(t.slots[1].ty, PartitionType::Used(7));
        assert_eq!(t.slots[1].size_mb, 3000);
        assert_eq!(t.slots[2], PartitionSlot::default());
        assert_eq!(t.slots[3], PartitionSlot::default());
        Ok(())
    }

    #[test]
    fn plan_document_rejects_extra_slots() {
        let input = r#"{"disk_name":"c1t0d0","slots":[{},{},{},{},{}]}"#;
        assert!(serde_json::from_str::<PartitionTable>(input).is_err());

        let input = r#"{"disk_name":"c1t0d0","slots":[{"type":"bogus"}]}"#;
        assert!(serde_json::from_str::<PartitionTable>(input).is_err());
    }

    #[test]
    fn serialized_type_is_numeric() -> Result<()> {
        let mut t = PartitionTable::empty("c1t0d0");
        t.slots[0] = solaris(1, 10);
        let v = serde_json::to_value(&t)?;
        assert_eq!(v["slots"][0]["type"], 0xBF);
        assert_eq!(v["slots"][1]["type"], 100);

        let back: PartitionTable = serde_json::from_value(v)?;
        assert_eq!(back, t);
        Ok(())
    }

    #[test]
    fn geometry_validation() {
        let geom = |size_sectors, cylinder_sectors| DiskGeometry {
            size_sectors,
            cylinder_sectors,
        };
        assert!(geom(20_480_000, 8192).validate().is_ok());
        assert!(geom(0, 8192).validate().is_err());
        assert!(geom(20_480_000, 0).validate().is_err());
        assert!(geom(8192, 8192).validate().is_err());

        let g = geom(20_480_000, 8192);
        assert_eq!(g.size_mb(), 10_000);
        assert_eq!(g.cylinder_mb(), 4);
    }

    #[test]
    fn dump_format() {
        let mut t = PartitionTable::empty("c1t0d0");
        t.slots[0] = PartitionSlot {
            id: 1,
            ty: PartitionType::Used(SUNIXOS2),
            size_mb: 4996,
            size_sectors: 10_231_808,
            offset_sectors: 8192,
        };
        let d = t.dump();
        assert_eq!(d.len(), NUMPART);
        assert_eq!(d[0], "[0] pos=1, id=BF, beg=8192, size=10231808(4996 MiB)");
        assert_eq!(d[1], "[1] pos=0, id=64, beg=0, size=0(0 MiB)");
    }
}
