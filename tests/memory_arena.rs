use ash::vk;
use strata::renderer::memory::device_memory::packed_size;
use strata::renderer::memory::{ArenaLayout, MemoryError, MemoryHeap, MemoryType, MemoryTypeRegistry};

const DEVICE_LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_COHERENT;

/// Integrated-GPU-like table: one heap, every type device local
fn unified_registry() -> MemoryTypeRegistry {
    MemoryTypeRegistry::from_parts(
        vec![MemoryHeap {
            index: 0,
            size: 4 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        }],
        vec![
            MemoryType { index: 0, heap_index: 0, property_flags: DEVICE_LOCAL },
            MemoryType {
                index: 1,
                heap_index: 0,
                property_flags: DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT,
            },
            MemoryType {
                index: 2,
                heap_index: 0,
                property_flags: DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT
                    | vk::MemoryPropertyFlags::HOST_CACHED,
            },
        ],
    )
}

fn req(size: u64, alignment: u64, memory_type_bits: u32) -> vk::MemoryRequirements {
    vk::MemoryRequirements { size, alignment, memory_type_bits }
}

#[test]
fn selection_follows_driver_order() {
    let registry = unified_registry();
    let staging = HOST_VISIBLE | HOST_COHERENT;

    assert_eq!(registry.find_by_bits(0b111, DEVICE_LOCAL).map(|t| t.index), Some(0));
    assert_eq!(registry.find_by_bits(0b111, staging).map(|t| t.index), Some(1));
    // Masked out of the preferred type, the next compatible one wins
    assert_eq!(registry.find_by_bits(0b100, staging).map(|t| t.index), Some(2));
}

#[test]
fn selection_is_deterministic() {
    let registry = unified_registry();
    let requirements = req(1024, 256, 0b110);
    let first = registry.find_compatible(&requirements, HOST_VISIBLE);
    for _ in 0..8 {
        assert_eq!(registry.find_compatible(&requirements, HOST_VISIBLE), first);
    }
    assert_eq!(first.map(|t| t.index), Some(1));
}

#[test]
fn missing_type_reports_mask_and_flags() {
    let registry = unified_registry();
    let lazily = vk::MemoryPropertyFlags::LAZILY_ALLOCATED;
    match registry.require(0b111, lazily) {
        Err(MemoryError::NoCompatibleType { type_bits, flags }) => {
            assert_eq!(type_bits, 0b111);
            assert_eq!(flags, lazily);
        }
        other => panic!("expected NoCompatibleType, got {other:?}"),
    }
    assert!(registry.require(0, DEVICE_LOCAL).is_err());
}

#[test]
fn registry_heap_lookup() {
    let registry = unified_registry();
    let ty = registry.types()[2];
    assert_eq!(registry.heap(&ty).map(|h| h.size), Some(4 << 30));
    assert_eq!(registry.heaps().len(), 1);
}

#[test]
fn packed_size_is_enough_for_one_batch() {
    let requirements = [req(65_536, 256, 1), req(12, 4, 1), req(4096, 4096, 1), req(3, 1, 1)];
    let mut arena = ArenaLayout::new(packed_size(&requirements));
    let requests = requirements
        .iter()
        .map(|r| (r.size, r.alignment))
        .collect::<Vec<_>>();

    let placed = arena.reserve(&requests).unwrap();
    for (placement, r) in placed.iter().zip(&requirements) {
        assert_eq!(placement.offset % r.alignment, 0);
        assert!(placement.size >= r.size);
    }
    assert_eq!(arena.high_water_mark(), arena.size());
}

#[test]
fn offsets_grow_monotonically_without_releases() {
    let mut arena = ArenaLayout::new(1 << 20);
    let mut last_end = 0;
    for (size, alignment) in [(100, 16), (7, 1), (4096, 256), (1, 64), (333, 4)] {
        let placement = arena.reserve(&[(size, alignment)]).unwrap()[0];
        assert!(placement.offset >= last_end);
        assert_eq!(placement.offset % alignment, 0);
        last_end = placement.offset + placement.size;
        assert_eq!(arena.high_water_mark(), last_end);
    }
    assert_eq!(arena.slot_count(), 5);
}

#[test]
fn failed_batch_leaves_arena_untouched() {
    let mut arena = ArenaLayout::new(1024);
    arena.reserve(&[(256, 256)]).unwrap();
    let before = (arena.free(), arena.slot_count(), arena.high_water_mark());

    let result = arena.reserve(&[(256, 256), (1024, 256)]);
    assert!(matches!(result, Err(MemoryError::Exhausted { requested: 1280, free: 768 })));
    assert_eq!((arena.free(), arena.slot_count(), arena.high_water_mark()), before);
}

#[test]
fn released_ranges_are_reused_first_fit() {
    let mut arena = ArenaLayout::new(4096);
    let placed = arena.reserve(&[(1024, 256), (1024, 256), (1024, 256)]).unwrap();

    assert_eq!(arena.release(placed[1].slot).map(|p| p.offset), Some(1024));
    assert!(arena.placement(placed[1].slot).is_none());
    assert_eq!(arena.free(), 2048);

    // The freed gap comes before the tail, so it is picked first
    let refill = arena.reserve(&[(512, 256)]).unwrap()[0];
    assert_eq!(refill.offset, 1024);
    let next = arena.reserve(&[(512, 512)]).unwrap()[0];
    assert_eq!(next.offset, 1536);
    assert_eq!(arena.used(), 4096 - 1024);

    // Releasing twice is a no-op
    assert!(arena.release(placed[1].slot).is_none());
}
