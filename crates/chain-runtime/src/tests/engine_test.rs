//! Engine lifecycle: persistence, determinism and the running loops

use std::{sync::Arc, time::Duration};

use chain_types::{hash_strings, ChainId, Address, RequestId};
use vstate::{MemoryDb, SledDb, StateDb};

use super::*;
use crate::{clock::ManualClock, RuntimeError};

#[test]
fn test_same_requests_same_state() {
    let first = engine();
    let second = engine();
    assert_eq!(first.state_hash(), second.state_hash());

    let batch = || {
        vec![
            deploy_counter(10, "counter", 7),
            request(11, user("dave"), "counter", inccounter::FUNC_INC_COUNTER),
            request(12, user("dave"), "nowhere", "x"),
        ]
    };
    let a = first.run_batch(batch()).unwrap();
    let b = second.run_batch(batch()).unwrap();
    assert_eq!(a.state_hash, b.state_hash);
    assert_eq!(a.results, b.results);

    let other = engine();
    let c = other
        .run_batch(vec![deploy_counter(10, "counter", 8)])
        .unwrap();
    assert_ne!(c.state_hash, a.state_hash);
}

#[test]
fn test_reload_resumes_chain() {
    let db: Arc<dyn StateDb> = Arc::new(MemoryDb::new());
    let hash = {
        let engine = engine_on(db.clone());
        run(&engine, vec![deploy_counter(10, "counter", 3)]);
        engine.state_hash()
    };

    let engine = engine_on(db.clone());
    assert_eq!(engine.block_index(), Some(2));
    assert_eq!(engine.state_hash(), hash);
    assert_eq!(counter(&engine, "counter"), 3);

    let foreign = EngineConfig {
        chain_id: ChainId(Address::from_seed("another-chain")),
        ..config()
    };
    assert!(matches!(
        Engine::new(foreign, db, processors()),
        Err(RuntimeError::Genesis(_))
    ));
}

#[test]
fn test_sled_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain");

    let hash = {
        let db = Arc::new(SledDb::open(&path).unwrap());
        let engine = engine_on(db);
        run(
            &engine,
            vec![
                deploy_counter(10, "counter", 41),
                request(11, owner(), "counter", inccounter::FUNC_INC_COUNTER),
            ],
        );
        engine.state_hash()
    };

    let db = Arc::new(SledDb::open(&path).unwrap());
    let engine = engine_on(db);
    assert_eq!(engine.state_hash(), hash);
    assert_eq!(counter(&engine, "counter"), 42);
    assert_eq!(engine.chain_info().unwrap().contract_count, 3);
}

#[test]
fn test_genesis_ids_are_taken() {
    let engine = engine();
    let tx = chain_types::hash_data(&[b"genesis".as_slice(), engine.chain_id().0.as_bytes().as_slice()]);
    let replay = Request::new(
        RequestId::new(tx, 0),
        owner(),
        root_contract::hname(),
        Hname::of(chain_types::FUNC_INIT),
    );
    assert!(matches!(engine.post_request(replay), Err(RuntimeError::DuplicateRequest(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_posted_requests_are_executed() {
    let engine = engine();
    let mut updates = engine.subscribe();
    engine.run_batch(vec![deploy_counter(1000, "counter", 0)]).unwrap();
    assert!(updates.recv().await.unwrap().is_done());

    engine.start().unwrap();
    for i in 0..20 {
        engine
            .post_request(request(i, user("erin"), "counter", inccounter::FUNC_INC_COUNTER))
            .unwrap();
    }
    assert!(engine.wait_empty_backlog(Some(Duration::from_secs(10))).await);
    assert_eq!(counter(&engine, "counter"), 20);

    let update = updates.recv().await.unwrap();
    assert!(update.is_done());
    assert!(update.results.iter().all(|r| r.outcome.is_success()));

    engine.join().await;
    assert!(!engine.is_running());
    assert!(matches!(
        engine.post_request(request(99, user("erin"), "counter", inccounter::FUNC_INC_COUNTER)),
        Err(RuntimeError::IntakeClosed)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_time_locked_request_waits_for_clock() {
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = Engine::with_clock(config(), Arc::new(MemoryDb::new()), processors(), clock.clone()).unwrap();
    engine.run_batch(vec![deploy_counter(1000, "counter", 0)]).unwrap();
    engine.start().unwrap();

    let locked = request(0, user("frank"), "counter", inccounter::FUNC_INC_COUNTER).with_time_lock(1_005);
    engine.post_request(locked).unwrap();
    engine
        .post_request(request(1, user("frank"), "counter", inccounter::FUNC_INC_COUNTER))
        .unwrap();

    assert!(!engine.wait_empty_backlog(Some(Duration::from_millis(300))).await);
    assert_eq!(engine.backlog_len(), 1);
    assert_eq!(counter(&engine, "counter"), 1);

    clock.set(1_005);
    assert!(engine.wait_empty_backlog(Some(Duration::from_secs(10))).await);
    assert_eq!(counter(&engine, "counter"), 2);

    engine.join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_join_keeps_unprocessed_backlog() {
    let clock = Arc::new(ManualClock::new(0));
    let engine = Engine::with_clock(config(), Arc::new(MemoryDb::new()), processors(), clock).unwrap();
    engine.start().unwrap();

    let id = RequestId::new(hash_strings(&["later"]), 0);
    let req = Request::new(id, owner(), root_contract::hname(), Hname::of("x")).with_time_lock(10);
    engine.post_request(req).unwrap();
    engine.join().await;

    assert_eq!(engine.backlog_len(), 1);
    assert_eq!(engine.block_index(), Some(1));
}
