/*
 * Copyright 2023 Oxide Computer Company
 */

use serde::{Deserialize, Serialize};

use crate::common::*;
use crate::error::{PlanError, PlanResult};
use crate::partition::{DiskGeometry, PartitionTable};
use crate::reconcile::reconcile;

/**
 * A disk found by target discovery, along with its current fdisk table if it
 * has one.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskTarget {
    pub name: String,
    pub geometry: DiskGeometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub boot_disk: bool,
    #[serde(default)]
    pub removable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<PartitionTable>,
}

/**
 * Everything an install session knows about the disks on the system: the
 * results of target discovery, and the partition table that has been
 * committed for installation (if any).  The session owns this value and
 * hands it to the operations below; committing requires a mutable borrow, so
 * there is only ever one writer.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCatalog {
    #[serde(default)]
    pub discovery_done: bool,
    #[serde(default)]
    pub disks: Vec<DiskTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed: Option<DiskTarget>,
}

impl DiskCatalog {
    fn ready(&self) -> PlanResult<()> {
        if !self.discovery_done {
            return Err(PlanError::DiscoveryNeeded);
        }
        if self.disks.is_empty() {
            return Err(PlanError::NoDisksFound);
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> PlanResult<&DiskTarget> {
        self.disks
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| PlanError::BadDiskName(name.to_string()))
    }

    /**
     * Return a copy of the fdisk partition table discovered on the named
     * disk.
     */
    pub fn partition_info(&self, name: &str) -> PlanResult<PartitionTable> {
        if name.is_empty() {
            return Err(PlanError::BadDiskName(name.to_string()));
        }
        self.ready()?;

        self.lookup(name)?
            .partitions
            .clone()
            .ok_or_else(|| PlanError::NoPartitions(name.to_string()))
    }

    /**
     * The table a proposal for this disk is compared against: the committed
     * table if one was committed for this disk, otherwise the table found on
     * the disk, otherwise an empty table.
     */
    fn baseline(&self, log: &Logger, disk: &DiskTarget) -> PartitionTable {
        if let Some(c) = &self.committed {
            if c.name == disk.name {
                if let Some(t) = &c.partitions {
                    return t.clone();
                }
            }
        }

        match &disk.partitions {
            Some(t) => t.clone(),
            None => {
                info!(log, "disk {} currently doesn't contain any partition",
                    disk.name);
                PartitionTable::empty(&disk.name)
            }
        }
    }

    /**
     * Check a proposed partition table for one of the discovered disks and
     * return the table with corrected offsets and sizes.  The catalog is not
     * changed; use commit() to keep the result.
     */
    pub fn validate_and_resize(
        &self,
        log: &Logger,
        proposed: &PartitionTable,
    ) -> PlanResult<PartitionTable> {
        self.ready()?;
        if proposed.disk_name.is_empty() {
            return Err(PlanError::InvalidInput(
                "partition table has no disk name".into(),
            ));
        }

        let disk = self.lookup(&proposed.disk_name)?;
        let old = self.baseline(log, disk);

        reconcile(log, &old, proposed, &disk.geometry)
    }

    /**
     * Save the partition table to be used when the install creates the disk
     * partitions.  Any previously committed table is replaced.
     */
    pub fn commit(
        &mut self,
        log: &Logger,
        table: PartitionTable,
    ) -> PlanResult<()> {
        if table.disk_name.is_empty() {
            return Err(PlanError::InvalidInput(
                "partition table has no disk name".into(),
            ));
        }
        self.ready()?;

        let disk = self.lookup(&table.disk_name)?;
        if disk.partitions.is_none() {
            info!(log, "no disk partitions defined prior to install");
        }

        let mut target = disk.clone();
        target.partitions = Some(table);

        if let Some(prev) = self.committed.replace(target) {
            info!(log, "replacing partition table committed for {}",
                prev.name);
        }

        Ok(())
    }

    pub fn committed(&self) -> Option<&DiskTarget> {
        self.committed.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::partition::{PartitionSlot, PartitionType, SUNIXOS2};

    fn catalog() -> DiskCatalog {
        let input = "discovery_done = true\n\
            \n\
            [[disks]]\n\
            name = \"c1t0d0\"\n\
            vendor = \"ATA\"\n\
            serial_number = \"S1\"\n\
            boot_disk = true\n\
            geometry = { size_sectors = 20480000, cylinder_sectors = 8192 }\n\
            \n\
            [[disks]]\n\
            name = \"c2t0d0\"\n\
            geometry = { size_sectors = 40960000, cylinder_sectors = 16065 }\n\
            \n\
            [disks.partitions]\n\
            disk_name = \"c2t0d0\"\n\
            \n\
            [[disks.partitions.slots]]\n\
            id = 1\n\
            type = \"solaris\"\n\
            size_mb = 10000\n\
            size_sectors = 20480000\n\
            offset_sectors = 16065\n";
        toml::from_str(input).unwrap()
    }

    fn proposal(disk: &str, size_mb: u64) -> PartitionTable {
        let mut t = PartitionTable::empty(disk);
        t.slots[0] =
            PartitionSlot::new(1, PartitionType::Used(SUNIXOS2), size_mb);
        t
    }

    #[test]
    fn parse_catalog() {
        let c = catalog();
        assert!(c.discovery_done);
        assert_eq!(c.disks.len(), 2);
        assert_eq!(c.disks[0].vendor.as_deref(), Some("ATA"));
        assert!(c.disks[0].boot_disk);
        assert!(c.disks[0].partitions.is_none());
        assert_eq!(c.disks[1].partitions.as_ref().unwrap().solaris_slot(),
            Some(0));
        assert!(c.committed().is_none());
    }

    #[test]
    fn partition_info_errors() {
        let c = catalog();
        assert_eq!(c.partition_info(""),
            Err(PlanError::BadDiskName("".into())));
        assert_eq!(c.partition_info("c9t0d0"),
            Err(PlanError::BadDiskName("c9t0d0".into())));
        assert_eq!(c.partition_info("c1t0d0"),
            Err(PlanError::NoPartitions("c1t0d0".into())));
        assert_eq!(c.partition_info("c2t0d0").unwrap().slots[0].size_mb,
            10000);

        assert_eq!(DiskCatalog::default().partition_info("c1t0d0"),
            Err(PlanError::DiscoveryNeeded));
        let empty = DiskCatalog { discovery_done: true, ..Default::default() };
        assert_eq!(empty.partition_info("c1t0d0"),
            Err(PlanError::NoDisksFound));
    }

    #[test]
    fn resize_against_empty_disk() {
        let log = init_log();
        let c = catalog();

        let out = c.validate_and_resize(&log, &proposal("c1t0d0", 5000))
            .unwrap();
        assert_eq!(out.slots[0].offset_sectors, 8192);
        assert_eq!(out.slots[0].size_mb, 4996);
    }

    #[test]
    fn resize_errors() {
        let log = init_log();
        let c = catalog();

        assert_eq!(c.validate_and_resize(&log, &proposal("c9t0d0", 5000)),
            Err(PlanError::BadDiskName("c9t0d0".into())));
        assert!(matches!(c.validate_and_resize(&log, &proposal("", 5000)),
            Err(PlanError::InvalidInput(_))));
        assert_eq!(DiskCatalog::default()
            .validate_and_resize(&log, &proposal("c1t0d0", 5000)),
            Err(PlanError::DiscoveryNeeded));
    }

    #[test]
    fn commit_becomes_baseline() {
        let log = init_log();
        let mut c = catalog();

        let first = c.validate_and_resize(&log, &proposal("c1t0d0", 5000))
            .unwrap();
        c.commit(&log, first.clone()).unwrap();

        let target = c.committed().unwrap();
        assert_eq!(target.name, "c1t0d0");
        assert_eq!(target.serial_number.as_deref(), Some("S1"));
        assert_eq!(target.partitions.as_ref(), Some(&first));

        /*
         * Re-submitting the committed table changes nothing.
         */
        let again = c.validate_and_resize(&log, &first).unwrap();
        assert_eq!(again, first);

        /*
         * Shrinking is now measured against the committed table.
         */
        let mut smaller = first.clone();
        smaller.slots[0].size_mb = 2000;
        let out = c.validate_and_resize(&log, &smaller).unwrap();
        assert_eq!(out.slots[0].size_mb, 1996);
    }

    #[test]
    fn commit_replaces_previous() {
        let log = init_log();
        let mut c = catalog();

        c.commit(&log, proposal("c1t0d0", 5000)).unwrap();
        c.commit(&log, proposal("c2t0d0", 7000)).unwrap();
        assert_eq!(c.committed().unwrap().name, "c2t0d0");

        assert_eq!(c.commit(&log, proposal("c9t0d0", 1)),
            Err(PlanError::BadDiskName("c9t0d0".into())));
        assert!(matches!(c.commit(&log, proposal("", 1)),
            Err(PlanError::InvalidInput(_))));
        assert_eq!(c.committed().unwrap().name, "c2t0d0");
    }

    #[test]
    fn catalog_survives_json() {
        let log = init_log();
        let mut c = catalog();
        c.commit(&log, proposal("c1t0d0", 5000)).unwrap();

        let s = serde_json::to_string(&c).unwrap();
        let back: DiskCatalog = serde_json::from_str(&s).unwrap();
        assert_eq!(back, c);
    }
}
