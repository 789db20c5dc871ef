//! Region table and checked memory access integration coverage.

use std::sync::{Arc, Mutex};

use debugger_core::{
    AddressSpace, DebugError, DebugEvent, EventHub, MemoryRegion, RegionKind,
};
use proptest as _;
use rstest as _;
use thiserror as _;
use tracing as _;

fn recording_hub() -> (Arc<EventHub>, Arc<Mutex<Vec<DebugEvent>>>) {
    let hub = Arc::new(EventHub::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink_log = Arc::clone(&log);
    hub.subscribe(Box::new(move |event: &DebugEvent| {
        sink_log.lock().expect("event log lock").push(event.clone());
    }));
    (hub, log)
}

#[test]
fn overlapping_region_add_fails_and_preserves_the_existing_set() {
    let space = AddressSpace::new(Arc::new(EventHub::new()));
    space
        .add_region(MemoryRegion::ram(0x1000, 0x1000).expect("region"))
        .expect("first region maps cleanly");

    let second = MemoryRegion::ram(0x1800, 0x1000).expect("region");
    assert_eq!(
        space.add_region(second),
        Err(DebugError::RegionOverlap {
            base: 0x1800,
            end: 0x2800
        })
    );

    let map = space.memory_map();
    assert_eq!(map.len(), 1);
    assert_eq!(map[0].start, 0x1000);
    assert_eq!(map[0].end, 0x2000);
    assert_eq!(map[0].size, 0x1000);
    assert_eq!(map[0].kind, RegionKind::Ram);
}

#[test]
fn containing_region_lookup_is_exact_over_many_regions() {
    let space = AddressSpace::new(Arc::new(EventHub::new()));
    for index in 0_u32..16 {
        let base = 0x1_0000 + index * 0x200;
        space
            .add_region(MemoryRegion::ram(base, 0x100).expect("region"))
            .expect("disjoint regions");
    }

    let hit = space.region_at(0x1_0480).expect("inside the third region");
    assert_eq!(hit.start, 0x1_0400);
    assert!(space.region_at(0x1_0180).is_none());
    assert!(space.contains(0x1_0000));
    assert!(!space.contains(0x0_FFFF));
}

#[test]
fn ram_write_read_round_trips_while_rom_write_is_rejected() {
    let space = AddressSpace::new(Arc::new(EventHub::new()));
    space
        .add_region(MemoryRegion::ram(0x4000, 0x100).expect("region"))
        .expect("RAM maps");
    space
        .add_region(MemoryRegion::rom(0x8000, vec![0x4E, 0x71]).expect("region"))
        .expect("ROM maps");

    space.write_byte(0x4002, 0xA5).expect("RAM write");
    assert_eq!(space.read_byte(0x4002), Ok(0xA5));

    assert_eq!(
        space.write_byte(0x8001, 0x00),
        Err(DebugError::ReadOnly { address: 0x8001 })
    );
    assert_eq!(space.read_byte(0x8001), Ok(0x71));
}

#[test]
fn long_round_trip_is_big_endian_across_four_bytes() {
    let space = AddressSpace::new(Arc::new(EventHub::new()));
    space
        .add_region(MemoryRegion::ram(0x2000, 0x40).expect("region"))
        .expect("RAM maps");

    space.write_long(0x2010, 0xCAFE_F00D).expect("RAM write");
    assert_eq!(space.read_long(0x2010), Ok(0xCAFE_F00D));
    assert_eq!(space.read_byte(0x2010), Ok(0xCA));
    assert_eq!(space.read_byte(0x2011), Ok(0xFE));
    assert_eq!(space.read_byte(0x2012), Ok(0xF0));
    assert_eq!(space.read_byte(0x2013), Ok(0x0D));
}

#[test]
fn span_crossing_accesses_fail_deterministically_for_any_value() {
    let space = AddressSpace::new(Arc::new(EventHub::new()));
    space
        .add_region(MemoryRegion::ram(0x1000, 0x10).expect("region"))
        .expect("RAM maps");
    space
        .add_region(MemoryRegion::ram(0x1010, 0x10).expect("region"))
        .expect("adjacent RAM maps");

    for value in [0_u32, 1, 0xFFFF_FFFF, 0x8000_0000] {
        assert_eq!(
            space.write_long(0x100E, value),
            Err(DebugError::SpanCrossesRegion {
                address: 0x100E,
                width: 4
            })
        );
    }
    assert_eq!(
        space.read_long(0x100E),
        Err(DebugError::SpanCrossesRegion {
            address: 0x100E,
            width: 4
        })
    );
    assert_eq!(space.read_byte(0x100F), Ok(0));
    assert_eq!(space.read_byte(0x1010), Ok(0));
}

#[test]
fn region_lifecycle_publishes_added_and_removed_events() {
    let (hub, log) = recording_hub();
    let space = AddressSpace::new(hub);

    space
        .add_region(MemoryRegion::rom(0x0000, vec![0xFF; 8]).expect("region"))
        .expect("ROM maps");
    space.remove_region(0x0000).expect("exact base removal");

    let log = log.lock().expect("event log lock");
    assert_eq!(log.len(), 2);
    match &log[0] {
        DebugEvent::RegionAdded { descriptor } => {
            assert_eq!(descriptor.start, 0x0000);
            assert_eq!(descriptor.size, 8);
            assert_eq!(descriptor.kind, RegionKind::Rom);
        }
        other => panic!("expected RegionAdded, got {other:?}"),
    }
    assert!(matches!(&log[1], DebugEvent::RegionRemoved { descriptor } if descriptor.start == 0));
}

#[test]
fn rejected_region_add_publishes_nothing() {
    let (hub, log) = recording_hub();
    let space = AddressSpace::new(hub);
    space
        .add_region(MemoryRegion::ram(0x1000, 0x100).expect("region"))
        .expect("RAM maps");
    let before = log.lock().expect("event log lock").len();

    let overlap = MemoryRegion::ram(0x1080, 0x100).expect("region");
    assert!(space.add_region(overlap).is_err());
    assert_eq!(log.lock().expect("event log lock").len(), before);
}

#[test]
fn memory_map_lists_regions_in_address_order_with_kinds() {
    let space = AddressSpace::new(Arc::new(EventHub::new()));
    space
        .add_region(MemoryRegion::ram(0x0010_0000, 0x800).expect("region"))
        .expect("RAM maps");
    space
        .add_region(MemoryRegion::rom(0x0000_0000, vec![0; 0x400]).expect("region"))
        .expect("ROM maps");

    let map = space.memory_map();
    assert_eq!(map.len(), 2);
    assert_eq!(map[0].start, 0x0000_0000);
    assert_eq!(map[0].kind, RegionKind::Rom);
    assert_eq!(map[1].start, 0x0010_0000);
    assert_eq!(map[1].kind, RegionKind::Ram);
}
