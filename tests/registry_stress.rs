//! 回调上下文注册表的并发压力测试

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use clamav_binding::clamav::{ContextRegistry, ExternalKey};

const THREADS: usize = 50;
const ROUNDS: usize = 1000;

#[test]
fn register_resolve_unregister_under_contention() {
    let registry = Arc::new(ContextRegistry::<(usize, usize)>::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut keys = Vec::with_capacity(ROUNDS);
                for round in 0..ROUNDS {
                    let key = registry.register((thread_id, round));
                    assert_eq!(registry.resolve(key), (thread_id, round));
                    assert_eq!(registry.unregister(key), (thread_id, round));
                    assert!(!registry.contains(key));
                    keys.push(key);
                }
                keys
            })
        })
        .collect();

    let mut seen: HashSet<ExternalKey> = HashSet::new();
    for worker in workers {
        for key in worker.join().unwrap() {
            assert!(seen.insert(key), "key {:#x} 被发放了两次", key.id());
        }
    }

    assert_eq!(seen.len(), THREADS * ROUNDS);
    assert!(registry.is_empty());
}

#[test]
fn live_contexts_never_cross_resolve() {
    let registry = Arc::new(ContextRegistry::<String>::new());

    let workers: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let registry = registry.clone();
            thread::spawn(move || {
                // 每个线程同时持有多个存活的上下文
                let live: Vec<_> = (0..20)
                    .map(|i| {
                        let value = format!("{}-{}", thread_id, i);
                        (registry.register(value.clone()), value)
                    })
                    .collect();
                for _ in 0..10 {
                    for (key, value) in &live {
                        assert_eq!(&registry.resolve(*key), value);
                    }
                }
                for (key, value) in live {
                    assert_eq!(registry.unregister(key), value);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(registry.len(), 0);
}

#[test]
fn guards_release_on_every_thread() {
    let registry = Arc::new(ContextRegistry::<usize>::new());

    thread::scope(|scope| {
        for thread_id in 0..THREADS {
            let registry = &registry;
            scope.spawn(move || {
                for _ in 0..100 {
                    let guard = registry.enter(thread_id);
                    assert_eq!(registry.resolve(guard.key()), thread_id);
                }
            });
        }
    });

    assert!(registry.is_empty());
}
