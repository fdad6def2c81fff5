//! Same-id serialization under concurrent access
//!
//! The store has no compare-and-swap, so these tests drive concurrent
//! readers and plan runs against one id (with injected generator
//! latency to widen the race window) and assert that each slot is
//! generated exactly once and no write is lost.

mod common;

use std::time::Duration;

use common::{full_mock, input, ready_answers, service_with};
use intake::store::RecordStore;
use intake::submission::SegmentFamily;
use intake::task::{ACTION_PLAN_SLOT, REPORT_SLOT, SUMMARY_SLOT};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_backfill_exactly_once() {
    let (generator, _, service) =
        service_with(full_mock().with_latency(Duration::from_millis(50)));
    let outcome = service
        .create(input(SegmentFamily::Pulse, ready_answers()))
        .await
        .unwrap();

    let a = {
        let service = service.clone();
        let id = outcome.id.clone();
        tokio::spawn(async move { service.get(&id).await })
    };
    let b = {
        let service = service.clone();
        let id = outcome.id.clone();
        tokio::spawn(async move { service.get(&id).await })
    };

    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();

    assert_eq!(generator.calls_for(REPORT_SLOT), 1);
    assert!(first.slot(REPORT_SLOT).is_some());
    assert!(second.slot(REPORT_SLOT).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn read_racing_the_plan_never_double_generates() {
    let (generator, store, service) =
        service_with(full_mock().with_latency(Duration::from_millis(30)));
    let outcome = service
        .create(input(SegmentFamily::Assessment, ready_answers()))
        .await
        .unwrap();

    let plan = {
        let service = service.clone();
        let id = outcome.id.clone();
        tokio::spawn(async move { service.run_plan(&id).await })
    };
    let read = {
        let service = service.clone();
        let id = outcome.id.clone();
        tokio::spawn(async move { service.get(&id).await })
    };

    plan.await.unwrap().unwrap();
    read.await.unwrap().unwrap();

    // whichever side went first, every slot was generated exactly once
    assert_eq!(generator.calls_for(REPORT_SLOT), 1);
    assert_eq!(generator.calls_for(ACTION_PLAN_SLOT), 1);
    assert_eq!(generator.calls_for(SUMMARY_SLOT), 1);

    let stored = store.get(&outcome.id).unwrap().unwrap();
    assert!(stored.slot(REPORT_SLOT).is_some());
    assert!(stored.slot(ACTION_PLAN_SLOT).is_some());
    assert!(stored.slot(SUMMARY_SLOT).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_submissions_enrich_independently() {
    let (generator, store, service) =
        service_with(full_mock().with_latency(Duration::from_millis(20)));
    let left = service
        .create(input(SegmentFamily::Pulse, ready_answers()))
        .await
        .unwrap();
    let right = service
        .create(input(SegmentFamily::Pulse, ready_answers()))
        .await
        .unwrap();

    let a = {
        let service = service.clone();
        let id = left.id.clone();
        tokio::spawn(async move { service.run_plan(&id).await })
    };
    let b = {
        let service = service.clone();
        let id = right.id.clone();
        tokio::spawn(async move { service.run_plan(&id).await })
    };

    assert!(a.await.unwrap().unwrap().completed());
    assert!(b.await.unwrap().unwrap().completed());

    // one generation per id, no cross-id interference
    assert_eq!(generator.calls_for(REPORT_SLOT), 2);
    assert!(store.get(&left.id).unwrap().unwrap().slot(REPORT_SLOT).is_some());
    assert!(store.get(&right.id).unwrap().unwrap().slot(REPORT_SLOT).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_explicit_task_and_read_keep_the_record_whole() {
    let (generator, store, service) =
        service_with(full_mock().with_latency(Duration::from_millis(30)));
    let outcome = service
        .create(input(SegmentFamily::Pulse, ready_answers()))
        .await
        .unwrap();

    let task = {
        let service = service.clone();
        let id = outcome.id.clone();
        tokio::spawn(async move { service.run_task(&id, REPORT_SLOT).await })
    };
    let read = {
        let service = service.clone();
        let id = outcome.id.clone();
        tokio::spawn(async move { service.get(&id).await })
    };

    task.await.unwrap().unwrap();
    read.await.unwrap().unwrap();

    // explicit regeneration may add one call on top of a read backfill,
    // but the stored record always ends up populated
    let calls = generator.calls_for(REPORT_SLOT);
    assert!((1..=2).contains(&calls), "unexpected call count {}", calls);
    let stored = store.get(&outcome.id).unwrap().unwrap();
    assert_eq!(
        stored.slot(REPORT_SLOT).unwrap()["headline"],
        "Positioned to move"
    );
}
