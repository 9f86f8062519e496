/*
 * Copyright 2023 Oxide Computer Company
 */

use thiserror::Error;

/**
 * Failures reported by the partition planning operations.  Nothing here is
 * retryable: every variant describes a problem with the input or with the
 * state of the disk catalog at the time of the call.
 */
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Malformed or mismatched partition tables or disk geometry.
    #[error("invalid partition plan: {0}")]
    InvalidInput(String),

    /// The disk name was empty or is not known to the catalog.
    #[error("bad disk name {0:?}")]
    BadDiskName(String),

    /// Target discovery has not completed yet.
    #[error("target discovery has not completed")]
    DiscoveryNeeded,

    /// Target discovery completed without finding any disks.
    #[error("no disks found")]
    NoDisksFound,

    /// The disk exists but carries no fdisk partition table.
    #[error("disk {0} has no partition table")]
    NoPartitions(String),

    #[error("invalid size {0:?}")]
    InvalidSize(String),

    #[error("invalid partition type {0:?}")]
    InvalidType(String),
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
