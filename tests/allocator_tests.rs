//! Integration tests for the bank allocator.
//!
//! Covers the pool life cycle through the public API, routing across
//! several banks, and property tests for the layout invariants.

use proptest::prelude::*;
use std::sync::Arc;
use tiledma::memory::{
    AllocError, BankSelector, HeapSegment, MemoryBanks, MemorySegment, PoolAllocator, PoolConfig,
};
use tiledma::{Error, ErrorKind, ManagerConfig, TileManager};
use tiledma::dma::{Completion, SoftTransfer};

// ============================================================================
// Pool Life Cycle
// ============================================================================

/// Allocate, free, realign, drain, then claim the whole pool again.
#[test]
fn test_pool_round_trip_reclaims_whole_pool() {
    let segment = HeapSegment::local(1024).unwrap();
    let base = segment.as_ptr() as usize;
    let mut pool = PoolAllocator::new(base, 1024, PoolConfig::default()).unwrap();

    let a = pool.alloc(300, 1).unwrap();
    let b = pool.alloc(300, 1).unwrap();
    assert_eq!(a, base);
    assert_eq!(b, base + 300);

    assert!(pool.free(a));
    let c = pool.alloc(200, 64).unwrap();
    assert_eq!(c % 64, 0);

    assert!(pool.free(b));
    assert!(pool.free(c));
    assert_eq!(pool.free_blocks().collect::<Vec<_>>(), vec![(base, 1024)]);

    // Descriptors live outside the pool, so nothing is lost to headers.
    let whole = pool.alloc(1024, 1).unwrap();
    assert_eq!(whole, base);
    assert_eq!(pool.stats().free_bytes, 0);
}

/// Unknown and null addresses are ignored.
#[test]
fn test_pool_free_is_permissive() {
    let mut pool = PoolAllocator::new(0x10_000, 4096, PoolConfig::default()).unwrap();
    let a = pool.alloc(128, 16).unwrap();
    let before = pool.stats();

    assert!(!pool.free(0));
    assert!(!pool.free(a + 1));
    assert!(!pool.free(0x90_000));
    assert_eq!(pool.stats(), before);
}

/// A split that needs a descriptor fails cleanly once the table is full.
#[test]
fn test_pool_metadata_exhaustion() {
    let config = PoolConfig {
        descriptors: 3,
        min_split: 0,
    };
    let mut pool = PoolAllocator::new(0x1000, 1024, config).unwrap();
    pool.alloc(100, 1).unwrap();
    pool.alloc(100, 1).unwrap();
    let before = pool.stats();

    assert_eq!(pool.alloc(100, 1), Err(AllocError::DescriptorsExhausted));
    assert_eq!(pool.stats(), before);
    // The last free block can still be taken whole.
    assert!(pool.alloc(824, 1).is_ok());
}

// ============================================================================
// Memory Banks
// ============================================================================

fn banks(sizes: &[usize]) -> MemoryBanks {
    let segments = sizes
        .iter()
        .map(|&s| Arc::new(HeapSegment::local(s).unwrap()) as Arc<dyn MemorySegment>)
        .collect();
    MemoryBanks::new(segments, PoolConfig::default()).unwrap()
}

/// `Any` falls through to the next bank once the first is full.
#[test]
fn test_banks_any_falls_through() {
    let mut banks = banks(&[512, 2048]);
    let first = banks.allocate(400, BankSelector::Any, 64).unwrap();
    assert_eq!(first.bank(), Some(0));

    let second = banks.allocate(400, BankSelector::Any, 64).unwrap();
    assert_eq!(second.bank(), Some(1));

    let pinned = banks.allocate(64, BankSelector::Index(1), 64).unwrap();
    assert_eq!(pinned.bank(), Some(1));

    assert!(matches!(
        banks.allocate(4096, BankSelector::Any, 64),
        Err(Error::AllocationFailed(AllocError::OutOfMemory { .. }))
    ));
    assert!(matches!(
        banks.allocate(16, BankSelector::Index(2), 64),
        Err(Error::BadArgument(_))
    ));
}

/// Frees route by address; foreign pointers are rejected.
#[test]
fn test_banks_free_routing() {
    let mut banks = banks(&[1024, 1024]);
    let a = banks.allocate(256, BankSelector::Index(1), 8).unwrap();
    assert_eq!(banks.stats(1).unwrap().live_allocations, 1);

    banks.free(a.as_ptr()).unwrap();
    assert_eq!(banks.stats(1).unwrap().live_allocations, 0);

    let outside = [0u8; 4];
    assert!(matches!(banks.free(outside.as_ptr()), Err(Error::BadArgument(_))));
    assert_eq!(banks.free(std::ptr::null()), Err(Error::NullBuffer));
}

/// Manager buffer operations record their outcome.
#[test]
fn test_manager_buffer_errors() {
    let mut tm = TileManager::new(SoftTransfer::new(Completion::Immediate), ManagerConfig::default()).unwrap();
    assert_eq!(tm.allocate_buffer(64, BankSelector::Any, 8), Err(Error::NullManager));
    assert_eq!(tm.last_error(), ErrorKind::NullManager);

    let config = ManagerConfig::default().with_heap_bank(1024).with_heap_bank(1024);
    let mut tm = TileManager::new(SoftTransfer::new(Completion::Immediate), config).unwrap();
    assert_eq!(tm.bank_count(), 2);

    let buf = tm.allocate_buffer(512, BankSelector::Index(1), 64).unwrap();
    assert_eq!(tm.last_error(), ErrorKind::Success);
    assert!(tm.allocate_buffer(100, BankSelector::Any, 3).is_err());
    assert_eq!(tm.last_error(), ErrorKind::BadArgument);

    tm.free_buffer(buf.as_ptr()).unwrap();
    assert_eq!(tm.free_buffer(std::ptr::null()), Err(Error::NullBuffer));
    assert_eq!(tm.last_error(), ErrorKind::NullBuffer);

    tm.allocate_buffer(900, BankSelector::Index(0), 8).unwrap();
    tm.free_all_buffers().unwrap();
    assert_eq!(tm.bank_stats(0).unwrap().free_bytes, 1024);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Live allocations never overlap, honour their alignment and stay in
    /// the pool; freeing them all leaves a single block.
    #[test]
    fn prop_pool_layout(
        requests in prop::collection::vec((1usize..300, 0u32..7), 1..40),
        free_mask in prop::collection::vec(any::<bool>(), 40),
    ) {
        let base = 0x4000;
        let size = 8192;
        let mut pool = PoolAllocator::new(base, size, PoolConfig::default()).unwrap();
        let mut live: Vec<(usize, usize)> = Vec::new();

        for (i, &(len, shift)) in requests.iter().enumerate() {
            let align = 1usize << shift;
            if let Ok(addr) = pool.alloc(len, align) {
                prop_assert_eq!(addr % align, 0);
                prop_assert!(addr >= base && addr + len <= base + size);
                for &(other, other_len) in &live {
                    prop_assert!(addr + len <= other || other + other_len <= addr);
                }
                live.push((addr, len));
            }
            if free_mask[i] && !live.is_empty() {
                let (addr, _) = live.remove(i % live.len());
                prop_assert!(pool.free(addr));
            }
        }

        for (addr, _) in live.drain(..) {
            prop_assert!(pool.free(addr));
        }
        prop_assert_eq!(pool.free_blocks().collect::<Vec<_>>(), vec![(base, size)]);
        prop_assert_eq!(pool.descriptors_in_use(), 1);
        prop_assert_eq!(pool.stats().free_bytes, size);
    }
}
