// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

use memory::constants::FRAME_SIZE;
use memory::{DirectMap, FrameNumber, FrameRange};
use physmem::{
    AllocationError, FrameState, MetadataLocation, PoolId, PoolRegistry, ReleaseError,
    ReservationError,
};

// The frames used for state tables, which lie outside
// every pool.
//
const METADATA_BASE: usize = 4096;
const METADATA_FRAMES: usize = 4;

// Returns a registry, along with a mapping of simulated
// physical memory for the state tables.
//
fn setup() -> (PoolRegistry, DirectMap) {
    let buffer: &'static mut [u8] = vec![0u8; METADATA_FRAMES * FRAME_SIZE].leak();
    let offset = (buffer.as_mut_ptr() as usize).wrapping_sub(METADATA_BASE * FRAME_SIZE);
    let memory = DirectMap::new(offset);
    (PoolRegistry::new(), memory)
}

// Adds a pool whose frames all start out free, with its
// state table in metadata frame `slot`.
//
fn add_pool(
    registry: &mut PoolRegistry,
    memory: &DirectMap,
    slot: usize,
    base: usize,
    count: usize,
) -> PoolId {
    let metadata = FrameRange::new(FrameNumber::new(METADATA_BASE + slot), 1);
    unsafe {
        registry.construct(
            memory,
            FrameNumber::new(base),
            count,
            MetadataLocation::External(metadata),
        )
    }
    .unwrap()
}

fn states(registry: &PoolRegistry, id: PoolId) -> Vec<FrameState> {
    let pool = registry.pool(id).unwrap();
    pool.frame_range()
        .frames()
        .map(|frame| pool.state(frame).unwrap())
        .collect()
}

fn frame(n: usize) -> FrameNumber {
    FrameNumber::new(n)
}

#[test]
fn scenario_a() {
    use FrameState::{Continuation, Free, HeadOfRun};

    let (mut registry, memory) = setup();
    let pool = add_pool(&mut registry, &memory, 0, 16, 16);

    assert_eq!(registry.allocate(pool, 4), Ok(frame(16)));
    assert_eq!(
        states(&registry, pool)[..5],
        [HeadOfRun, Continuation, Continuation, Continuation, Free]
    );
    assert_eq!(registry.allocate(pool, 4), Ok(frame(20)));
    assert_eq!(registry.release(frame(16)), Ok(4));
    assert_eq!(states(&registry, pool)[..4], [Free; 4]);
    assert_eq!(registry.allocate(pool, 2), Ok(frame(16)));
}

#[test]
fn scenario_b() {
    let (mut registry, memory) = setup();
    let pool = add_pool(&mut registry, &memory, 0, 8, 8);

    assert_eq!(registry.mark_inaccessible(pool, frame(10), 3), Ok(()));
    assert_eq!(registry.allocate(pool, 3), Ok(frame(13)));
}

#[test]
fn scenario_c() {
    let (mut registry, memory) = setup();
    let pool = add_pool(&mut registry, &memory, 0, 0, 8);

    // Frame zero is an ordinary result.
    assert_eq!(registry.allocate(pool, 8), Ok(frame(0)));
    assert_eq!(
        registry.allocate(pool, 1),
        Err(AllocationError::OutOfFrames { requested: 1 })
    );
    assert_eq!(registry.release(frame(0)), Ok(8));
    assert_eq!(registry.allocate(pool, 1), Ok(frame(0)));
}

#[test]
fn round_trip() {
    let (mut registry, memory) = setup();
    let pool = add_pool(&mut registry, &memory, 0, 100, 32);
    registry.allocate(pool, 3).unwrap();
    registry.mark_inaccessible(pool, frame(110), 5).unwrap();

    for n in 1..=17 {
        let before = states(&registry, pool);
        let head = registry.allocate(pool, n).unwrap();
        assert_ne!(states(&registry, pool), before);
        assert_eq!(registry.release(head), Ok(n));
        assert_eq!(states(&registry, pool), before);
    }
}

#[test]
fn exhaustion() {
    let (mut registry, memory) = setup();
    let pool = add_pool(&mut registry, &memory, 0, 64, 10);

    let frames: Vec<FrameNumber> = (0..10).map(|_| registry.allocate(pool, 1).unwrap()).collect();
    assert_eq!(
        registry.allocate(pool, 1),
        Err(AllocationError::OutOfFrames { requested: 1 })
    );

    for &released in [frames[6], frames[2], frames[9]].iter() {
        assert_eq!(registry.release(released), Ok(1));
        assert_eq!(registry.allocate(pool, 1), Ok(released));
    }
}

#[test]
fn reservation_exclusivity() {
    let (mut registry, memory) = setup();
    let pool = add_pool(&mut registry, &memory, 0, 0, 16);
    registry.allocate(pool, 2).unwrap();
    let head = registry.allocate(pool, 3).unwrap();
    registry.release(frame(0)).unwrap();

    let before = states(&registry, pool);
    for (start, n) in [(4, 1), (0, 3), (1, 10), (3, 1)] {
        assert!(matches!(
            registry.mark_inaccessible(pool, frame(start), n),
            Err(ReservationError::RangeNotFree(_))
        ));
        assert_eq!(states(&registry, pool), before);
    }

    assert_eq!(
        registry.mark_inaccessible(pool, frame(0), 3),
        Err(ReservationError::RangeNotFree(head))
    );
    assert_eq!(registry.mark_inaccessible(pool, frame(0), 2), Ok(()));
}

#[test]
fn release_validation() {
    let (mut registry, memory) = setup();
    let low = add_pool(&mut registry, &memory, 0, 16, 8);
    let high = add_pool(&mut registry, &memory, 1, 32, 8);
    let head = registry.allocate(low, 4).unwrap();
    registry.allocate(high, 2).unwrap();

    let before = (states(&registry, low), states(&registry, high));
    assert_eq!(
        registry.release(head + 2),
        Err(ReleaseError::NotAHead {
            frame: head + 2,
            state: FrameState::Continuation
        })
    );
    for unknown in [0, 15, 24, 31, 40, usize::MAX] {
        assert_eq!(
            registry.release(frame(unknown)),
            Err(ReleaseError::UnknownFrame(frame(unknown)))
        );
    }
    assert_eq!((states(&registry, low), states(&registry, high)), before);

    // Double release.
    assert_eq!(registry.release(head), Ok(4));
    assert_eq!(
        registry.release(head),
        Err(ReleaseError::NotAHead {
            frame: head,
            state: FrameState::Free
        })
    );
}

// A simple linear congruential generator, so the
// sequence of operations is the same every run.
//
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound
    }
}

// An unpacked model of a pool's frame states, using
// the simplest possible algorithms.
//
struct Model {
    base: usize,
    states: Vec<FrameState>,
}

impl Model {
    fn allocate(&mut self, n: usize) -> Option<usize> {
        let len = self.states.len();
        let start = (0..len.checked_sub(n)? + 1)
            .find(|&i| self.states[i..i + n].iter().all(|&s| s == FrameState::Free))?;
        self.mark(start, n);
        Some(self.base + start)
    }

    fn mark(&mut self, start: usize, n: usize) {
        self.states[start] = FrameState::HeadOfRun;
        for state in self.states[start + 1..start + n].iter_mut() {
            *state = FrameState::Continuation;
        }
    }

    fn release(&mut self, frame: usize) -> Option<usize> {
        let index = frame - self.base;
        if self.states[index] != FrameState::HeadOfRun {
            return None;
        }

        self.states[index] = FrameState::Free;
        let mut len = 1;
        while self.states.get(index + len) == Some(&FrameState::Continuation) {
            self.states[index + len] = FrameState::Free;
            len += 1;
        }

        Some(len)
    }
}

#[test]
fn matches_reference_model() {
    const BASE: usize = 1000;
    const COUNT: usize = 203;

    let (mut registry, memory) = setup();
    let pool = add_pool(&mut registry, &memory, 2, BASE, COUNT);
    let mut model = Model {
        base: BASE,
        states: vec![FrameState::Free; COUNT],
    };
    let mut rng = Lcg(0x5eed);
    let mut heads: Vec<usize> = Vec::new();

    for _ in 0..5000 {
        match rng.next(10) {
            0..=3 => {
                let n = rng.next(12) + 1;
                let got = registry.allocate(pool, n).ok().map(FrameNumber::as_usize);
                assert_eq!(got, model.allocate(n));
                heads.extend(got);
            }
            4..=6 if !heads.is_empty() => {
                let head = heads.swap_remove(rng.next(heads.len()));
                assert_eq!(registry.release(frame(head)).ok(), model.release(head));
            }
            7 => {
                let target = BASE + rng.next(COUNT);
                let expected = model.release(target);
                assert_eq!(registry.release(frame(target)).ok(), expected);
                if expected.is_some() {
                    heads.retain(|&h| h != target);
                }
            }
            _ => {
                let start = rng.next(COUNT);
                let n = rng.next(4) + 1;
                let fits = start + n <= COUNT;
                let free = fits
                    && model.states[start..start + n]
                        .iter()
                        .all(|&s| s == FrameState::Free);
                let got = registry.mark_inaccessible(pool, frame(BASE + start), n);
                assert_eq!(got.is_ok(), free);
                if free {
                    model.mark(start, n);
                    heads.push(BASE + start);
                }
            }
        }

        assert_eq!(states(&registry, pool), model.states);
        let free = model.states.iter().filter(|&&s| s == FrameState::Free).count();
        assert_eq!(registry.pool(pool).unwrap().free_frames(), free);
    }
}

#[test]
fn runs_never_overlap() {
    let (mut registry, memory) = setup();
    let pools = [
        add_pool(&mut registry, &memory, 0, 0, 97),
        add_pool(&mut registry, &memory, 1, 97, 64),
        add_pool(&mut registry, &memory, 3, 300, 33),
    ];
    let mut rng = Lcg(42);
    let mut heads: Vec<FrameNumber> = Vec::new();

    for _ in 0..2000 {
        if rng.next(3) == 0 && !heads.is_empty() {
            let head = heads.swap_remove(rng.next(heads.len()));
            registry.release(head).unwrap();
        } else {
            let pool = pools[rng.next(pools.len())];
            if let Ok(head) = registry.allocate(pool, rng.next(8) + 1) {
                heads.push(head);
            }
        }

        // Every run is contiguous, within one pool,
        // and disjoint from all others.
        let mut runs: Vec<FrameRange> = registry
            .iter()
            .flat_map(|(_, pool)| {
                pool.runs().inspect(move |run| {
                    assert!(pool.contains(run.start()));
                    assert!(run.end() <= pool.frame_range().end());
                })
            })
            .collect();
        runs.sort_by_key(|run| run.start());
        for pair in runs.windows(2) {
            assert!(!pair[0].overlaps(&pair[1]));
        }

        let mut live: Vec<FrameNumber> = runs.iter().map(FrameRange::start).collect();
        let mut expected = heads.clone();
        live.sort();
        expected.sort();
        assert_eq!(live, expected);
    }
}
