use kernel_frame_pool::{
    ContFramePool, FrameNumber, FramePoolError, FrameStateBitmap, PoolConfig, SharedFramePools,
};
use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

fn leaked_pool(base: u64, n_frames: usize) -> ContFramePool<'static> {
    let storage = vec![0u8; FrameStateBitmap::bytes_for(n_frames)].leak();
    ContFramePool::with_storage(PoolConfig::self_hosted(FrameNumber::new(base), n_frames), storage)
        .expect("pool")
}

#[test]
fn register_allocate_release() {
    let pools = SharedFramePools::<'static, 2>::new();
    let handle = pools.register(leaked_pool(0, 64)).unwrap();
    assert_eq!(pools.n_free_frames(), 63);

    let first = pools.get_frames_from(handle, 4).unwrap().unwrap();
    assert_eq!(first, FrameNumber::new(1));
    assert_eq!(pools.n_free_frames(), 59);
    assert_eq!(pools.release_frames(first), Ok(4));

    let other = pools.register(leaked_pool(64, 64)).unwrap();
    assert_eq!(other.index(), 1);
    assert_eq!(
        pools.release_frames(FrameNumber::new(500)),
        Err(FramePoolError::NoOwningPool {
            frame: FrameNumber::new(500)
        })
    );
}

#[test]
fn with_registry_sees_all_pools() {
    let pools = SharedFramePools::<'static, 4>::new();
    pools.register(leaked_pool(0, 32)).unwrap();
    pools.register(leaked_pool(32, 32)).unwrap();
    let (len, frames) = pools.with_registry(|r| (r.len(), r.n_frames()));
    assert_eq!((len, frames), (2, 64));
}

#[test]
fn get_mut_allows_direct_access() {
    let mut pools = SharedFramePools::<'static, 1>::new();
    pools.get_mut().register(leaked_pool(8, 8)).unwrap();
    assert_eq!(pools.n_free_frames(), 7);
}

#[test]
fn contended_allocations_never_overlap() {
    let threads = 8;
    let iters = 500;

    let pools = Arc::new(SharedFramePools::<'static, 4>::new());
    pools.register(leaked_pool(0, 256)).unwrap();
    pools.register(leaked_pool(256, 256)).unwrap();
    let initial = pools.n_free_frames();

    let owned = Arc::new(Mutex::new(HashSet::new()));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for t in 0..threads {
        let pools = Arc::clone(&pools);
        let owned = Arc::clone(&owned);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for i in 0..iters {
                let n = 1 + (t + i) % 5;
                let Some(first) = pools.get_frames(n).unwrap() else {
                    continue;
                };
                {
                    let mut owned = owned.lock().unwrap();
                    for f in 0..n as u64 {
                        assert!(owned.insert(first.as_u64() + f), "frame handed out twice");
                    }
                }
                {
                    let mut owned = owned.lock().unwrap();
                    for f in 0..n as u64 {
                        owned.remove(&(first.as_u64() + f));
                    }
                }
                assert_eq!(pools.release_frames(first), Ok(n));
            }
        }));
    }
    for h in handles {
        h.join().expect("worker panicked");
    }

    assert_eq!(pools.n_free_frames(), initial);
    pools.with_registry(|r| {
        for pool in r.iter() {
            assert_eq!(pool.n_free_frames(), pool.count_free_frames());
        }
    });
}

#[test]
fn shared_pools_can_live_in_a_static() {
    static POOLS: SharedFramePools<'static, 2> = SharedFramePools::new();

    POOLS.register(leaked_pool(4096, 16)).unwrap();
    let first = POOLS.get_frames(2).unwrap().unwrap();
    assert_eq!(first, FrameNumber::new(4097));
    assert_eq!(POOLS.release_frames(first), Ok(2));
}
