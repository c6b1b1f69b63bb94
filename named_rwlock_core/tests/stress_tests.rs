use named_rwlock_core::{Backend, NamedRwLock};
use rand::Rng;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
    time::{Duration, Instant},
};

fn lock_name(tag: &str, b: Backend) -> String {
    format!("s{}_{}_{}", tag, b as u8, std::process::id())
}

/// Readers and writers hammer one name; writers must always be alone and
/// readers must never see a writer inside.
#[test]
fn mixed_readers_and_writers() {
    for &b in Backend::all() {
        let name = lock_name("mix", b);
        let keeper = NamedRwLock::create_with(&name, b);
        assert!(keeper.is_created());

        let threads = num_cpus::get().clamp(2, 8) * 2;
        // > 0: readers inside, -1: a writer inside.
        let occupancy = Arc::new(AtomicI64::new(0));
        let writes = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let name = name.clone();
                let occupancy = Arc::clone(&occupancy);
                let writes = Arc::clone(&writes);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut rng = rand::rng();
                    let mut lock = NamedRwLock::create_with(&name, b);
                    assert!(lock.is_created());
                    barrier.wait();
                    for _ in 0..100 {
                        let hold = Duration::from_micros(rng.random_range(0..200));
                        if i % 3 == 0 {
                            if !lock.lock(1_000) {
                                continue;
                            }
                            assert_eq!(occupancy.swap(-1, Ordering::SeqCst), 0);
                            thread::sleep(hold);
                            assert_eq!(occupancy.swap(0, Ordering::SeqCst), -1);
                            writes.fetch_add(1, Ordering::Relaxed);
                            assert!(lock.unlock());
                        } else {
                            if !lock.lock_read(1_000) {
                                continue;
                            }
                            assert!(occupancy.fetch_add(1, Ordering::SeqCst) >= 0);
                            thread::sleep(hold);
                            assert!(occupancy.fetch_sub(1, Ordering::SeqCst) >= 1);
                            assert!(lock.unlock_read(-1));
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().expect("stress thread panicked");
        }
        assert_eq!(occupancy.load(Ordering::SeqCst), 0);
        assert!(writes.load(Ordering::Relaxed) > 0);
        assert_eq!(keeper.reader_count(), 0);
    }
}

/// Many threads racing to open the same fresh name all end up on one lock.
#[test]
fn construction_race() {
    for &b in Backend::all() {
        for round in 0..5 {
            let name = format!("{}_{}", lock_name("race", b), round);
            let threads = num_cpus::get().clamp(2, 8);
            let barrier = Arc::new(Barrier::new(threads));
            let go = Arc::new(AtomicBool::new(false));

            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let name = name.clone();
                    let barrier = Arc::clone(&barrier);
                    let go = Arc::clone(&go);
                    thread::spawn(move || {
                        barrier.wait();
                        let lock = NamedRwLock::create_with(&name, b);
                        assert!(lock.is_created(), "open of {} failed", name);
                        // Keep every handle alive until all have opened.
                        while !go.load(Ordering::Acquire) {
                            thread::sleep(Duration::from_millis(1));
                        }
                        lock
                    })
                })
                .collect();

            thread::sleep(Duration::from_millis(50));
            go.store(true, Ordering::Release);
            let mut locks: Vec<NamedRwLock> = handles
                .into_iter()
                .map(|h| h.join().expect("opener panicked"))
                .collect();

            assert_eq!(locks.iter().filter(|l| l.has_ownership()).count(), 1);

            // They all share one lock.
            assert!(locks[0].lock(0));
            for other in locks.iter_mut().skip(1) {
                assert!(!other.lock_read(0));
            }
            assert!(locks[0].unlock());

            // Drop the owner last.
            locks.sort_by_key(|l| l.has_ownership());
        }
    }
}

/// Readers keep coming; a writer with a generous budget still gets in once
/// they pause. Fairness is not promised, so only eventual entry is checked.
#[test]
fn writer_gets_in_between_reader_bursts() {
    for &b in Backend::all() {
        let name = lock_name("burst", b);
        let _keep = NamedRwLock::create_with(&name, b);
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..num_cpus::get().clamp(2, 4))
            .map(|_| {
                let name = name.clone();
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut rng = rand::rng();
                    let mut lock = NamedRwLock::create_with(&name, b);
                    while !stop.load(Ordering::Acquire) {
                        if lock.lock_read(100) {
                            thread::sleep(Duration::from_micros(rng.random_range(50..500)));
                            assert!(lock.unlock_read(-1));
                        }
                        thread::sleep(Duration::from_micros(rng.random_range(100..1_000)));
                    }
                })
            })
            .collect();

        let mut writer = NamedRwLock::create_with(&name, b);
        let start = Instant::now();
        let got = writer.lock(10_000);
        let took = start.elapsed();
        if got {
            assert!(writer.unlock());
        }
        stop.store(true, Ordering::Release);
        for r in readers {
            r.join().expect("reader panicked");
        }
        assert!(got, "{:?} writer starved for {:?}", b, took);
    }
}
