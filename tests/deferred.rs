mod common;

use common::World;
use instapool::*;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

const FRAME: Duration = Duration::from_millis(10);

fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_fires_after_exact_delay() {
    let mut pool = PoolManager::new(World::new());
    let coin = pool.acquire(&"coin").unwrap();
    let id = coin.id();
    let (fired, callback) = counter();
    pool.release_deferred_with(coin, FRAME * 3, callback)
        .unwrap();

    assert_eq!(pool.tick(FRAME), 0);
    assert_eq!(pool.tick(FRAME), 0);
    assert!(pool.is_active(id));
    assert_eq!(pool.tick(FRAME), 1);
    assert!(!pool.is_active(id));
    assert_eq!(pool.idle_count(&"coin"), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    assert_eq!(pool.tick(FRAME), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats().released, 1);
}

#[test]
fn test_equal_delays_fire_in_schedule_order() {
    let mut pool = PoolManager::new(World::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut expected = Vec::new();
    for _ in 0..4 {
        let coin = pool.acquire(&"coin").unwrap();
        let id = coin.id();
        expected.push(id);
        let order = order.clone();
        pool.release_deferred_with(coin, FRAME, move || order.lock().unwrap().push(id))
            .unwrap();
    }
    let late = pool.acquire(&"coin").unwrap();
    pool.release_deferred(late, FRAME * 2).unwrap();

    assert_eq!(pool.tick(FRAME), 4);
    assert_eq!(*order.lock().unwrap(), expected);
    assert_eq!(pool.pending_deferred(), 1);
    assert_eq!(pool.tick(FRAME), 1);
    assert_eq!(pool.active_count(), 0);
}

#[test]
fn test_zero_delay_fires_on_next_tick() {
    let mut pool = PoolManager::new(World::new());
    let coin = pool.acquire(&"coin").unwrap();
    pool.release_deferred(coin, Duration::ZERO).unwrap();
    assert_eq!(pool.active_count(), 1);
    assert_eq!(pool.tick(Duration::ZERO), 1);
    assert_eq!(pool.active_count(), 0);
}

#[test]
fn test_drain_cancels_pending() {
    let mut pool = PoolManager::new(World::new());
    let coin = pool.acquire(&"coin").unwrap();
    let (fired, callback) = counter();
    pool.release_deferred_with(coin, FRAME, callback).unwrap();

    assert_eq!(pool.drain_and_destroy_all(), 1);
    assert_eq!(pool.pending_deferred(), 0);
    assert_eq!(pool.tick(FRAME * 2), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(pool.allocator().destroyed().len(), 1);
}

#[test]
fn test_recycled_instance_is_not_released_twice() {
    let mut pool = PoolManager::new(World::new());
    let coin = pool
        .acquire_with(&"coin", AcquireOptions::new().parent("level"))
        .unwrap();
    let id = coin.id();
    let (fired, callback) = counter();
    pool.release_deferred_with(coin, FRAME, callback).unwrap();

    assert_eq!(pool.release_children(&"level"), 1);
    let again = pool.acquire(&"coin").unwrap();
    assert_eq!(again.id(), id);

    assert_eq!(pool.tick(FRAME), 0);
    assert!(pool.is_active(id));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cancel_returns_instance() {
    let mut pool = PoolManager::new(World::new());
    let coin = pool.acquire(&"coin").unwrap();
    let id = coin.id();
    let ticket = pool.release_deferred(coin, FRAME).unwrap();

    let coin = pool.cancel_deferred(ticket).unwrap();
    assert_eq!(coin.id(), id);
    assert!(pool.cancel_deferred(ticket).is_none());
    assert_eq!(pool.tick(FRAME), 0);
    assert!(pool.is_active(id));
    pool.release(coin).unwrap();
}

#[test]
fn test_foreign_instance_is_destroyed_immediately() {
    let mut pool = PoolManager::new(World::new());
    let stray = pool.allocator_mut().spawn("coin");
    let (fired, callback) = counter();

    let err = pool
        .release_deferred_with(Pooled::detached(stray), FRAME, callback)
        .unwrap_err();
    assert!(err.is_unknown_instance());
    assert_eq!(pool.pending_deferred(), 0);
    assert_eq!(pool.allocator().destroyed(), vec![stray]);
    assert_eq!(pool.tick(FRAME), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_clock_accumulates() {
    let mut pool = PoolManager::new(World::new());
    pool.tick(FRAME);
    pool.tick(FRAME);
    assert_eq!(pool.now(), FRAME * 2);
}

#[test]
fn test_huge_delay_stays_pending() {
    let mut pool = PoolManager::new(World::new());
    pool.tick(FRAME);
    let coin = pool.acquire(&"coin").unwrap();
    let id = coin.id();
    pool.release_deferred(coin, Duration::MAX).unwrap();

    assert_eq!(pool.tick(FRAME), 0);
    assert_eq!(pool.pending_deferred(), 1);
    assert!(pool.is_active(id));
}

#[test]
fn test_clock_saturates() {
    let mut pool = PoolManager::new(World::new());
    pool.tick(Duration::MAX);
    pool.tick(FRAME);
    assert_eq!(pool.now(), Duration::MAX);
}

#[test]
fn test_each_callback_runs_after_its_own_release() {
    let world = World::new();
    let graveyard = world.graveyard.clone();
    let config = PoolConfig {
        max_idle_per_group: Some(0),
        ..PoolConfig::default()
    };
    let mut pool = PoolManager::with_config(world, config);
    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..3 {
        let coin = pool.acquire(&"coin").unwrap();
        let seen = seen.clone();
        let graveyard = graveyard.clone();
        pool.release_deferred_with(coin, FRAME, move || {
            seen.lock().unwrap().push(graveyard.lock().unwrap().len());
        })
        .unwrap();
    }

    assert_eq!(pool.tick(FRAME), 3);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_advance_returns_callbacks_after_all_releases() {
    let mut pool = PoolManager::new(World::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..2 {
        let coin = pool.acquire(&"coin").unwrap();
        let seen = seen.clone();
        pool.release_deferred_with(coin, FRAME, move || seen.lock().unwrap().push(()))
            .unwrap();
    }

    let callbacks = pool.advance(FRAME);
    assert_eq!(callbacks.len(), 2);
    assert_eq!(pool.idle_count(&"coin"), 2);
    assert!(seen.lock().unwrap().is_empty());
    for callback in callbacks {
        callback();
    }
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn test_detached_copy_of_active_handle_is_deferred() {
    let mut pool = PoolManager::new(World::new());
    let coin = pool.acquire(&"coin").unwrap();
    let id = coin.id();
    let (fired, callback) = counter();
    pool.release_deferred_with(Pooled::detached(*coin), FRAME, callback)
        .unwrap();

    assert_eq!(pool.tick(FRAME), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!pool.is_active(id));
    assert!(pool.is_tracked(id));
    assert!(pool.allocator().destroyed().is_empty());
    assert!(pool.release(coin).is_err());
}
