//! Unified bounds- and permission-checked address space over mapped regions.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::event::{DebugEvent, EventHub};
use crate::memory::{MemoryRegion, RegionDescriptor, LONG_BYTES, WORD_BYTES};
use crate::DebugError;

/// Ordered collection of non-overlapping [`MemoryRegion`]s presenting one
/// byte-addressable space.
///
/// The region table is kept sorted by base address; containment lookups
/// binary-search it, so they stay cheap on every memory access and fetch.
/// All operations take `&self`: the table sits behind a reader/writer lock so
/// an interactive caller (e.g. a memory-watch view) can read while a run loop
/// is in flight.
///
/// Multi-byte accesses are big-endian and must lie entirely within a single
/// region; a value is never split across two independently-owned buffers.
#[derive(Debug)]
pub struct AddressSpace {
    regions: RwLock<Vec<MemoryRegion>>,
    events: Arc<EventHub>,
}

impl AddressSpace {
    /// Creates an empty address space publishing region changes to `events`.
    #[must_use]
    pub fn new(events: Arc<EventHub>) -> Self {
        Self {
            regions: RwLock::new(Vec::new()),
            events,
        }
    }

    fn read_table(&self) -> RwLockReadGuard<'_, Vec<MemoryRegion>> {
        self.regions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, Vec<MemoryRegion>> {
        self.regions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maps `region` into the space, keeping the table ordered by base.
    ///
    /// On success the region's descriptor is returned and a
    /// [`DebugEvent::RegionAdded`] notification is published.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::RegionOverlap`] when the region's range
    /// intersects an already-mapped region; the table is left unchanged.
    pub fn add_region(&self, region: MemoryRegion) -> Result<RegionDescriptor, DebugError> {
        let descriptor = region.descriptor();
        {
            let mut table = self.write_table();
            let position = table.partition_point(|mapped| mapped.base() < region.base());
            let overlaps_prev = position
                .checked_sub(1)
                .is_some_and(|prev| table[prev].end() > u64::from(region.base()));
            let overlaps_next = table
                .get(position)
                .is_some_and(|next| region.end() > u64::from(next.base()));
            if overlaps_prev || overlaps_next {
                return Err(DebugError::RegionOverlap {
                    base: region.base(),
                    end: region.end(),
                });
            }
            table.insert(position, region);
        }
        debug!(
            start = descriptor.start,
            size = descriptor.size,
            "region mapped"
        );
        self.events.publish(&DebugEvent::RegionAdded { descriptor });
        Ok(descriptor)
    }

    /// Unmaps the region whose base address matches `base` exactly.
    ///
    /// On success the removed region's descriptor is returned and a
    /// [`DebugEvent::RegionRemoved`] notification is published.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::UnmappedAddress`] when no region is based at
    /// `base`.
    pub fn remove_region(&self, base: u32) -> Result<RegionDescriptor, DebugError> {
        let descriptor = {
            let mut table = self.write_table();
            let position = table
                .binary_search_by_key(&base, MemoryRegion::base)
                .map_err(|_| DebugError::UnmappedAddress { address: base })?;
            table.remove(position).descriptor()
        };
        debug!(start = descriptor.start, "region unmapped");
        self.events
            .publish(&DebugEvent::RegionRemoved { descriptor });
        Ok(descriptor)
    }

    /// Returns the descriptor of the region containing `address`, if any.
    #[must_use]
    pub fn region_at(&self, address: u32) -> Option<RegionDescriptor> {
        let table = self.read_table();
        find_index(&table, address).map(|index| table[index].descriptor())
    }

    /// Returns `true` when `address` is covered by a mapped region.
    #[must_use]
    pub fn contains(&self, address: u32) -> bool {
        self.region_at(address).is_some()
    }

    /// Returns the number of mapped regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.read_table().len()
    }

    /// Returns `true` when no region is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }

    /// Returns a copy of the bytes backing the region based exactly at
    /// `base`, or `None` when no region is based there.
    #[must_use]
    pub fn region_bytes(&self, base: u32) -> Option<Vec<u8>> {
        let table = self.read_table();
        table
            .binary_search_by_key(&base, MemoryRegion::base)
            .ok()
            .map(|index| table[index].bytes().to_vec())
    }

    /// Produces the ordered `{start, end, size, kind}` map of all regions.
    ///
    /// For display purposes only; it carries no behavioral invariants.
    #[must_use]
    pub fn memory_map(&self) -> Vec<RegionDescriptor> {
        self.read_table()
            .iter()
            .map(MemoryRegion::descriptor)
            .collect()
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::UnmappedAddress`] when no region covers
    /// `address`.
    pub fn read_byte(&self, address: u32) -> Result<u8, DebugError> {
        let table = self.read_table();
        let region = resolve(&table, address)?;
        let index = region
            .index_of(address)
            .ok_or(DebugError::UnmappedAddress { address })?;
        Ok(region.byte_at(index))
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::UnmappedAddress`] when no region covers
    /// `address`, or [`DebugError::ReadOnly`] when the region is ROM; the
    /// underlying byte is left unchanged on failure.
    pub fn write_byte(&self, address: u32, value: u8) -> Result<(), DebugError> {
        let mut table = self.write_table();
        let region = resolve_mut(&mut table, address)?;
        if !region.kind().is_writable() {
            return Err(DebugError::ReadOnly { address });
        }
        let index = region
            .index_of(address)
            .ok_or(DebugError::UnmappedAddress { address })?;
        region.set_byte_at(index, value);
        Ok(())
    }

    /// Reads a big-endian 16-bit word.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::UnmappedAddress`] when `address` is unmapped,
    /// or [`DebugError::SpanCrossesRegion`] when the two-byte span is not
    /// contained in a single region.
    pub fn read_word(&self, address: u32) -> Result<u16, DebugError> {
        let bytes: [u8; WORD_BYTES as usize] = self.read_span(address)?;
        Ok(u16::from_be_bytes(bytes))
    }

    /// Writes a big-endian 16-bit word.
    ///
    /// # Errors
    ///
    /// As [`AddressSpace::read_word`], plus [`DebugError::ReadOnly`] for ROM
    /// targets; no byte is written on failure.
    pub fn write_word(&self, address: u32, value: u16) -> Result<(), DebugError> {
        self.write_span(address, &value.to_be_bytes())
    }

    /// Reads a big-endian 32-bit long word.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::UnmappedAddress`] when `address` is unmapped,
    /// or [`DebugError::SpanCrossesRegion`] when the four-byte span is not
    /// contained in a single region.
    pub fn read_long(&self, address: u32) -> Result<u32, DebugError> {
        let bytes: [u8; LONG_BYTES as usize] = self.read_span(address)?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Writes a big-endian 32-bit long word.
    ///
    /// # Errors
    ///
    /// As [`AddressSpace::read_long`], plus [`DebugError::ReadOnly`] for ROM
    /// targets; no byte is written on failure.
    pub fn write_long(&self, address: u32, value: u32) -> Result<(), DebugError> {
        self.write_span(address, &value.to_be_bytes())
    }

    fn read_span<const N: usize>(&self, address: u32) -> Result<[u8; N], DebugError> {
        let width = N as u8;
        let table = self.read_table();
        let region = resolve(&table, address)?;
        if !region.contains_span(address, width) {
            return Err(DebugError::SpanCrossesRegion { address, width });
        }
        let index = region
            .index_of(address)
            .ok_or(DebugError::UnmappedAddress { address })?;
        let mut bytes = [0; N];
        bytes.copy_from_slice(region.slice(index, N));
        Ok(bytes)
    }

    fn write_span(&self, address: u32, bytes: &[u8]) -> Result<(), DebugError> {
        let width = bytes.len() as u8;
        let mut table = self.write_table();
        let region = resolve_mut(&mut table, address)?;
        if !region.kind().is_writable() {
            return Err(DebugError::ReadOnly { address });
        }
        if !region.contains_span(address, width) {
            return Err(DebugError::SpanCrossesRegion { address, width });
        }
        let index = region
            .index_of(address)
            .ok_or(DebugError::UnmappedAddress { address })?;
        region.slice_mut(index, bytes.len()).copy_from_slice(bytes);
        Ok(())
    }
}

fn find_index(table: &[MemoryRegion], address: u32) -> Option<usize> {
    let candidate = table.partition_point(|region| region.base() <= address);
    let index = candidate.checked_sub(1)?;
    table[index].contains(address).then_some(index)
}

fn resolve<'table>(
    table: &'table [MemoryRegion],
    address: u32,
) -> Result<&'table MemoryRegion, DebugError> {
    find_index(table, address)
        .map(|index| &table[index])
        .ok_or(DebugError::UnmappedAddress { address })
}

fn resolve_mut<'table>(
    table: &'table mut [MemoryRegion],
    address: u32,
) -> Result<&'table mut MemoryRegion, DebugError> {
    let index = find_index(table, address).ok_or(DebugError::UnmappedAddress { address })?;
    Ok(&mut table[index])
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::{any, proptest};

    use super::AddressSpace;
    use crate::event::EventHub;
    use crate::memory::{MemoryRegion, RegionKind};
    use crate::DebugError;

    fn space() -> AddressSpace {
        AddressSpace::new(Arc::new(EventHub::new()))
    }

    fn space_with_ram(base: u32, size: u32) -> AddressSpace {
        let space = space();
        space
            .add_region(MemoryRegion::ram(base, size).expect("RAM region"))
            .expect("mapping into an empty space");
        space
    }

    #[test]
    fn overlapping_add_is_rejected_and_leaves_the_table_unchanged() {
        let space = space_with_ram(0x1000, 0x1000);
        let overlapping = MemoryRegion::ram(0x1800, 0x1000).expect("RAM region");
        assert_eq!(
            space.add_region(overlapping),
            Err(DebugError::RegionOverlap {
                base: 0x1800,
                end: 0x2800
            })
        );
        assert_eq!(space.region_count(), 1);
        let map = space.memory_map();
        assert_eq!(map[0].start, 0x1000);
        assert_eq!(map[0].end, 0x2000);
    }

    #[test]
    fn adjacent_regions_do_not_overlap() {
        let space = space_with_ram(0x1000, 0x1000);
        space
            .add_region(MemoryRegion::ram(0x2000, 0x1000).expect("RAM region"))
            .expect("regions touching at 0x2000 are disjoint");
        space
            .add_region(MemoryRegion::ram(0x0800, 0x800).expect("RAM region"))
            .expect("regions touching at 0x1000 are disjoint");
        assert_eq!(space.region_count(), 3);
    }

    #[test]
    fn memory_map_is_ordered_by_base_address() {
        let space = space();
        for base in [0x4000_u32, 0x1000, 0x3000, 0x2000] {
            space
                .add_region(MemoryRegion::ram(base, 0x100).expect("RAM region"))
                .expect("disjoint regions");
        }
        let bases: Vec<u32> = space.memory_map().iter().map(|d| d.start).collect();
        assert_eq!(bases, vec![0x1000, 0x2000, 0x3000, 0x4000]);
    }

    #[test]
    fn remove_requires_an_exact_base_match() {
        let space = space_with_ram(0x1000, 0x1000);
        assert_eq!(
            space.remove_region(0x1004),
            Err(DebugError::UnmappedAddress { address: 0x1004 })
        );
        let removed = space.remove_region(0x1000).expect("exact base match");
        assert_eq!(removed.start, 0x1000);
        assert!(space.is_empty());
    }

    #[test]
    fn ram_bytes_round_trip() {
        let space = space_with_ram(0x1000, 0x100);
        space.write_byte(0x1010, 0x5A).expect("RAM write");
        assert_eq!(space.read_byte(0x1010), Ok(0x5A));
    }

    #[test]
    fn rom_writes_are_rejected_without_modifying_the_byte() {
        let space = space();
        space
            .add_region(MemoryRegion::rom(0x4000, vec![0x12, 0x34]).expect("ROM region"))
            .expect("mapping into an empty space");
        assert_eq!(
            space.write_byte(0x4000, 0xFF),
            Err(DebugError::ReadOnly { address: 0x4000 })
        );
        assert_eq!(
            space.write_word(0x4000, 0xBEEF),
            Err(DebugError::ReadOnly { address: 0x4000 })
        );
        assert_eq!(space.read_byte(0x4000), Ok(0x12));
        assert_eq!(space.read_word(0x4000), Ok(0x1234));
    }

    #[test]
    fn unmapped_accesses_report_the_faulting_address() {
        let space = space_with_ram(0x1000, 0x100);
        assert_eq!(
            space.read_byte(0x0FFF),
            Err(DebugError::UnmappedAddress { address: 0x0FFF })
        );
        assert_eq!(
            space.write_byte(0x1100, 0),
            Err(DebugError::UnmappedAddress { address: 0x1100 })
        );
        assert_eq!(
            space.read_long(0x2000),
            Err(DebugError::UnmappedAddress { address: 0x2000 })
        );
    }

    #[test]
    fn multi_byte_values_are_big_endian() {
        let space = space_with_ram(0x1000, 0x100);
        space.write_long(0x1000, 0x0102_0304).expect("RAM write");
        assert_eq!(space.read_byte(0x1000), Ok(0x01));
        assert_eq!(space.read_byte(0x1001), Ok(0x02));
        assert_eq!(space.read_byte(0x1002), Ok(0x03));
        assert_eq!(space.read_byte(0x1003), Ok(0x04));
        assert_eq!(space.read_word(0x1000), Ok(0x0102));
        assert_eq!(space.read_word(0x1002), Ok(0x0304));
    }

    #[test]
    fn span_crossing_accesses_fail_even_between_adjacent_regions() {
        let space = space_with_ram(0x1000, 0x10);
        space
            .add_region(MemoryRegion::ram(0x1010, 0x10).expect("RAM region"))
            .expect("adjacent region");
        assert_eq!(
            space.read_word(0x100F),
            Err(DebugError::SpanCrossesRegion {
                address: 0x100F,
                width: 2
            })
        );
        assert_eq!(
            space.write_long(0x100D, 0xDEAD_BEEF),
            Err(DebugError::SpanCrossesRegion {
                address: 0x100D,
                width: 4
            })
        );
        assert_eq!(space.read_byte(0x100D), Ok(0));
        assert_eq!(space.read_byte(0x1010), Ok(0));
    }

    #[test]
    fn span_check_applies_at_the_end_of_the_last_region() {
        let space = space_with_ram(0x1000, 0x10);
        assert_eq!(
            space.read_long(0x100E),
            Err(DebugError::SpanCrossesRegion {
                address: 0x100E,
                width: 4
            })
        );
        assert_eq!(space.read_word(0x100E), Ok(0));
    }

    proptest! {
        #[test]
        fn mapped_regions_stay_pairwise_disjoint(
            bases in proptest::collection::vec(0_u32..0x1_0000, 1..8),
            size in 1_u32..0x400,
        ) {
            let space = space();
            for base in bases {
                let region = MemoryRegion::ram(base, size).expect("RAM region");
                let _ = space.add_region(region);
            }
            let map = space.memory_map();
            for pair in map.windows(2) {
                assert!(pair[0].end <= u64::from(pair[1].start));
            }
        }

        #[test]
        fn long_values_round_trip_at_any_aligned_offset(
            value in any::<u32>(),
            offset in 0_u32..0xFC,
        ) {
            let space = space_with_ram(0x8000, 0x100);
            let address = 0x8000 + offset;
            space.write_long(address, value).expect("in-bounds RAM write");
            assert_eq!(space.read_long(address), Ok(value));
        }
    }
}
