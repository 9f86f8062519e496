/*
 * Copyright 2023 Oxide Computer Company
 */

use crate::common::*;
use crate::error::{PlanError, PlanResult};
use crate::partition::{DiskGeometry, PartitionSlot, PartitionTable, NUMPART};

fn is_resized(old: &PartitionSlot, new: &PartitionSlot) -> bool {
    old.size_mb != new.size_mb
}

fn is_created(old: &PartitionSlot, new: &PartitionSlot) -> bool {
    !old.is_used() && new.is_used()
}

fn is_deleted(old: &PartitionSlot, new: &PartitionSlot) -> bool {
    old.is_used() && !new.is_used()
}

/**
 * Does this slot need its offset and size recalculated?  A change of type
 * alone does not move a partition.
 */
fn needs_placement(old: &PartitionSlot, new: &PartitionSlot) -> bool {
    is_resized(old, new) || is_created(old, new) || is_deleted(old, new)
}

fn is_changed(old: &PartitionSlot, new: &PartitionSlot) -> bool {
    needs_placement(old, new) || (old.ty != new.ty && new.size_mb != 0)
}

/**
 * The "whole disk" layout: a single Solaris2 partition in the first slot that
 * covers the entire disk, with every other slot empty.  The installer lays
 * that out itself, so there is nothing to reconcile.
 */
fn is_whole_disk(table: &PartitionTable, geometry: &DiskGeometry) -> bool {
    let first = &table.slots[0];

    first.ty.is_solaris()
        && first.size_mb == geometry.size_mb()
        && table.slots[1..]
            .iter()
            .all(|s| s.size_mb == 0 && s.ty.is_unused())
}

/**
 * Where slot "i" must start: gaps are not allowed, so a partition begins right
 * where the previous used partition ends.  The first used partition starts at
 * the first cylinder.
 */
fn expected_start(
    table: &PartitionTable,
    i: usize,
    geometry: &DiskGeometry,
) -> u64 {
    match table.previous_used(i) {
        Some(prev) => table.slots[prev].end_sectors(),
        None => geometry.cylinder_sectors,
    }
}

/**
 * The furthest sector slot "i" may extend to.  An unchanged partition that
 * follows it stays where it is; a following partition that is itself being
 * placed in this pass will be positioned after this one instead.
 */
fn placement_limit(
    old: &PartitionTable,
    table: &PartitionTable,
    i: usize,
    geometry: &DiskGeometry,
) -> u64 {
    match table.next_used(i) {
        Some(next) if !needs_placement(&old.slots[next], &table.slots[next]) => {
            table.slots[next].offset_sectors.min(geometry.size_sectors)
        }
        _ => geometry.size_sectors,
    }
}

/**
 * A slot that already sits where it belongs, and whose sector and megabyte
 * sizes agree, was placed by an earlier reconciliation against the same
 * baseline.  Placing it again would take the boot cylinder out of the first
 * partition a second time.
 */
fn is_settled(slot: &PartitionSlot, start: u64, limit: u64) -> bool {
    slot.size_sectors != 0
        && slot.offset_sectors == start
        && slot.end_sectors() <= limit
        && crate::units::sectors_to_mb(slot.size_sectors) == slot.size_mb
}

/**
 * Shrink a slot so that it ends at "end", recomputing the megabyte size from
 * the sector count.  A slot left with less than a megabyte is emptied.
 */
fn shrink_to(log: &Logger, slot: &mut PartitionSlot, i: usize, end: u64) {
    slot.size_sectors = end.saturating_sub(slot.offset_sectors);
    slot.set_mb_from_sectors();

    if slot.size_mb == 0 {
        warn!(log, "partition {} ({}) has no room left and is dropped", i,
            slot.ty);
        slot.clear_geometry();
    }
}

fn place(
    log: &Logger,
    old: &PartitionTable,
    table: &mut PartitionTable,
    i: usize,
    geometry: &DiskGeometry,
) {
    let start = expected_start(table, i, geometry);
    let first = table.previous_used(i).is_none();

    {
        let slot = &mut table.slots[i];
        slot.offset_sectors = start;

        if first {
            /*
             * The first cylinder is reserved for boot use, so the first
             * partition gives up that much space.
             */
            slot.size_mb = slot.size_mb.saturating_sub(geometry.cylinder_mb());
            info!(log, "{} ({}) is the first partition - will start at the \
                1st cylinder (sector {})", i, slot.ty, start);

            if slot.size_mb == 0 {
                warn!(log, "partition {} does not fit beside the boot \
                    cylinder and is dropped", i);
                slot.clear_geometry();
                return;
            }
        }

        slot.set_sectors_from_mb();
    }

    /*
     * If the partition overlaps a subsequent used partition that was not
     * changed, trim it to end where that one begins.  A subsequent partition
     * that was resized as well is placed on its own turn, after this one.
     */
    if let Some(next) = table.next_used(i) {
        if !needs_placement(&old.slots[next], &table.slots[next]) {
            let limit = table.slots[next].offset_sectors;
            if table.slots[i].end_sectors() > limit {
                shrink_to(log, &mut table.slots[i], i, limit);
                info!(log, "partition {} ({}) overlaps with subsequent \
                    partition, size will be adjusted to {} MB", i,
                    table.slots[i].ty, table.slots[i].size_mb);
            }
        }
    }

    if table.slots[i].end_sectors() > geometry.size_sectors {
        shrink_to(log, &mut table.slots[i], i, geometry.size_sectors);
        info!(log, "partition {} ({}) exceeds disk size, size will be \
            adjusted to {} MB", i, table.slots[i].ty, table.slots[i].size_mb);
    }
}

/**
 * Slide an unchanged partition down so that it follows its predecessor
 * without a gap.  Its size is left alone.
 */
fn close_gap(
    log: &Logger,
    table: &mut PartitionTable,
    i: usize,
    geometry: &DiskGeometry,
) {
    if !table.slots[i].is_used() {
        table.slots[i].clear_geometry();
        return;
    }

    let start = expected_start(table, i, geometry);
    let slot = &mut table.slots[i];
    if slot.offset_sectors > start {
        info!(log, "partition {} ({}) moves from sector {} to {}", i,
            slot.ty, slot.offset_sectors, start);
        slot.offset_sectors = start;
    }
}

/**
 * Check a proposed partition table against the previous one for the same disk
 * and compute the sector geometry of every partition that was created,
 * resized or deleted.  The result is a new table; neither input is modified.
 *
 * Partitions are processed once, in slot order.  Gaps are closed, an
 * enlarged partition is trimmed so that it neither runs into an unchanged
 * neighbour nor past the end of the disk, and the first partition always
 * starts after the boot cylinder.
 */
pub fn reconcile(
    log: &Logger,
    old: &PartitionTable,
    new: &PartitionTable,
    geometry: &DiskGeometry,
) -> PlanResult<PartitionTable> {
    if new.disk_name.is_empty() {
        return Err(PlanError::InvalidInput(
            "partition table has no disk name".into(),
        ));
    }
    if old.disk_name != new.disk_name {
        return Err(PlanError::InvalidInput(format!(
            "partition tables belong to different disks ({} != {})",
            old.disk_name, new.disk_name
        )));
    }
    geometry.validate()?;

    let mut out = new.clone();

    if is_whole_disk(new, geometry) {
        info!(log, "whole disk layout requested for {}", new.disk_name);
        return Ok(out);
    }

    if !(0..NUMPART).any(|i| is_changed(&old.slots[i], &new.slots[i])) {
        info!(log, "disk partition info not changed");
        return Ok(out);
    }
    info!(log, "disk partition info changed");

    debug_lines(log, "partition LBA information before recalculation",
        &out.dump());

    /*
     * Once any partition has been placed, everything after it is checked for
     * a gap left behind.
     */
    let mut disturbed = false;

    for i in 0..NUMPART {
        let orig = old.slots[i];

        if !needs_placement(&orig, &out.slots[i]) {
            if disturbed {
                close_gap(log, &mut out, i, geometry);
            }
            continue;
        }
        disturbed = true;

        if !out.slots[i].is_used() {
            if is_deleted(&orig, &out.slots[i]) {
                info!(log, "partition pos={}, type={} is deleted", orig.id,
                    orig.ty);
            }
            /*
             * The id is left alone; it belongs to whoever built the table.
             */
            out.slots[i].clear_geometry();
            continue;
        }

        if is_created(&orig, &out.slots[i]) {
            info!(log, "partition pos={}, type={} is created",
                out.slots[i].id, out.slots[i].ty);
        }

        let start = expected_start(&out, i, geometry);
        let limit = placement_limit(old, &out, i, geometry);
        if is_settled(&out.slots[i], start, limit) {
            debug!(log, "partition {} is already in place", i);
            continue;
        }

        place(log, old, &mut out, i, geometry);
    }

    debug_lines(log, "adjusted partition LBA information", &out.dump());

    Ok(out)
}
