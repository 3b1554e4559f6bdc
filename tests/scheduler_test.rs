//! Scheduled purchase execution against the in-memory store.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use common::{settings, Harness};
use vendora_backend::database::error::StoreResult;
use vendora_backend::database::models::{
    NewScheduledTransaction, ScheduleStatus, ScheduledRequestFields, ScheduledTransaction,
    TransactionStatus,
};
use vendora_backend::database::ScheduleStore;
use vendora_backend::system_config::StaticSystemConfigSource;
use vendora_backend::vending::{Category, ProviderId, ProviderResult};
use vendora_backend::workers::scheduler::INSUFFICIENT_BALANCE_AT_EXECUTION;
use vendora_backend::workers::{ScheduledPurchaseWorker, SchedulerConfig};

fn config() -> SchedulerConfig {
    SchedulerConfig {
        enabled: true,
        poll_interval: Duration::from_millis(50),
        batch_size: 10,
    }
}

fn worker(h: &Harness, schedules: Arc<dyn ScheduleStore>) -> ScheduledPurchaseWorker {
    ScheduledPurchaseWorker::new(
        schedules,
        Arc::new(h.store.clone()),
        h.fulfillment.clone(),
        Arc::new(StaticSystemConfigSource::new(settings())),
        config(),
    )
}

fn record(
    user_id: &str,
    category: Category,
    fields: ScheduledRequestFields,
    status: ScheduleStatus,
    scheduled_time: DateTime<Utc>,
) -> ScheduledTransaction {
    ScheduledTransaction {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        category,
        request_fields: fields,
        scheduled_time,
        status,
        error: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn data_fields(charge: Decimal) -> ScheduledRequestFields {
    ScheduledRequestFields {
        carrier: "MTN".to_string(),
        recipient: "08031234567".to_string(),
        plan_id: Some("mtn-1gb".to_string()),
        amount: charge,
        face_value: None,
        meter_type: None,
        quantity: None,
    }
}

fn airtime_fields(charge: Decimal) -> ScheduledRequestFields {
    ScheduledRequestFields {
        carrier: "MTN".to_string(),
        recipient: "08031234567".to_string(),
        plan_id: None,
        amount: charge,
        face_value: Some(charge),
        meter_type: None,
        quantity: None,
    }
}

fn an_hour_ago() -> DateTime<Utc> {
    Utc::now() - ChronoDuration::hours(1)
}

/// Delegates to the in-memory store and records the order of transitions.
struct RecordingSchedules {
    inner: Arc<dyn ScheduleStore>,
    calls: Mutex<Vec<(&'static str, Uuid)>>,
}

impl RecordingSchedules {
    fn new(inner: Arc<dyn ScheduleStore>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(&'static str, Uuid)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleStore for RecordingSchedules {
    async fn create(&self, new: NewScheduledTransaction) -> StoreResult<ScheduledTransaction> {
        self.inner.create(new).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ScheduledTransaction>> {
        self.inner.get(id).await
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ScheduledTransaction>> {
        self.inner.find_due(now, limit).await
    }

    async fn claim(&self, id: Uuid) -> StoreResult<bool> {
        self.calls.lock().unwrap().push(("claim", id));
        self.inner.claim(id).await
    }

    async fn complete(&self, id: Uuid) -> StoreResult<bool> {
        self.calls.lock().unwrap().push(("complete", id));
        self.inner.complete(id).await
    }

    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<bool> {
        self.calls.lock().unwrap().push(("fail", id));
        self.inner.fail(id, error).await
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<ScheduledTransaction>> {
        self.inner.list_for_user(user_id, limit).await
    }
}

#[tokio::test]
async fn due_data_purchase_completes_and_debits_locked_charge() {
    let h = Harness::new();
    h.fund("u1", dec!(1000)).await;
    let scheduled = record(
        "u1",
        Category::Data,
        data_fields(dec!(500)),
        ScheduleStatus::Pending,
        an_hour_ago(),
    );
    h.store.insert_schedule(scheduled.clone()).await;

    let report = worker(&h, Arc::new(h.store.clone())).run_cycle().await.unwrap();

    assert_eq!(report.due, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(h.store.balance("u1").await, Some(dec!(500)));

    let stored = h.store.get(scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScheduleStatus::Completed);
    assert_eq!(stored.error, None);

    let ledger = h.store.ledger().await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, TransactionStatus::Success);
    assert_eq!(ledger[0].amount, dec!(500));
    assert_eq!(ledger[0].category, Category::Data);
}

#[tokio::test]
async fn short_balance_fails_with_explicit_error_and_no_upstream_call() {
    let h = Harness::new();
    h.fund("u1", dec!(100)).await;
    let scheduled = record(
        "u1",
        Category::Airtime,
        airtime_fields(dec!(500)),
        ScheduleStatus::Pending,
        an_hour_ago(),
    );
    h.store.insert_schedule(scheduled.clone()).await;

    let report = worker(&h, Arc::new(h.store.clone())).run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    let stored = h.store.get(scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScheduleStatus::Failed);
    assert_eq!(
        stored.error.as_deref(),
        Some(INSUFFICIENT_BALANCE_AT_EXECUTION)
    );
    assert_eq!(stored.error.as_deref(), Some("Insufficient balance at execution time"));
    assert_eq!(h.store.balance("u1").await, Some(dec!(100)));
    assert_eq!(h.provider_a.executions(), 0);
    assert!(h.store.ledger().await.is_empty());
}

#[tokio::test]
async fn upstream_failure_is_terminal_and_recorded_verbatim() {
    let h = Harness::new();
    h.fund("u1", dec!(1000)).await;
    h.provider_b
        .push(ProviderResult::rejected(ProviderId::ProviderB, "Invalid phone number"));
    let scheduled = record(
        "u1",
        Category::Data,
        data_fields(dec!(500)),
        ScheduleStatus::Pending,
        an_hour_ago(),
    );
    h.store.insert_schedule(scheduled.clone()).await;

    let w = worker(&h, Arc::new(h.store.clone()));
    let report = w.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);

    let stored = h.store.get(scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScheduleStatus::Failed);
    let error = stored.error.unwrap();
    assert!(error.contains("Invalid phone number"), "error was {}", error);
    assert_eq!(h.store.balance("u1").await, Some(dec!(1000)));

    // no automatic retry on the next poll
    let report = w.run_cycle().await.unwrap();
    assert_eq!(report.due, 0);
    assert_eq!(h.provider_b.executions(), 1);
}

#[tokio::test]
async fn terminal_and_future_records_are_left_alone() {
    let h = Harness::new();
    h.fund("u1", dec!(5000)).await;
    let completed = record(
        "u1",
        Category::Data,
        data_fields(dec!(500)),
        ScheduleStatus::Completed,
        an_hour_ago(),
    );
    let failed = record(
        "u1",
        Category::Data,
        data_fields(dec!(500)),
        ScheduleStatus::Failed,
        an_hour_ago(),
    );
    let future = record(
        "u1",
        Category::Data,
        data_fields(dec!(500)),
        ScheduleStatus::Pending,
        Utc::now() + ChronoDuration::hours(6),
    );
    for r in [&completed, &failed, &future] {
        h.store.insert_schedule(r.clone()).await;
    }

    let report = worker(&h, Arc::new(h.store.clone())).run_cycle().await.unwrap();

    assert_eq!(report.due, 0);
    assert_eq!(h.provider_b.executions(), 0);
    assert_eq!(h.store.balance("u1").await, Some(dec!(5000)));
    assert_eq!(
        h.store.get(future.id).await.unwrap().unwrap().status,
        ScheduleStatus::Pending
    );
}

#[tokio::test]
async fn repeated_polling_processes_a_record_once() {
    let h = Harness::new();
    h.fund("u1", dec!(1000)).await;
    h.store
        .insert_schedule(record(
            "u1",
            Category::Data,
            data_fields(dec!(500)),
            ScheduleStatus::Pending,
            an_hour_ago(),
        ))
        .await;

    let w = worker(&h, Arc::new(h.store.clone()));
    for _ in 0..3 {
        w.run_cycle().await.unwrap();
    }

    assert_eq!(h.provider_b.executions(), 1);
    assert_eq!(h.store.balance("u1").await, Some(dec!(500)));
    assert_eq!(h.store.ledger().await.len(), 1);
}

#[tokio::test]
async fn every_record_is_claimed_before_reaching_a_terminal_state() {
    let h = Harness::new();
    h.fund("rich", dec!(1000)).await;
    h.fund("poor", dec!(10)).await;
    let ok = record(
        "rich",
        Category::Data,
        data_fields(dec!(500)),
        ScheduleStatus::Pending,
        an_hour_ago(),
    );
    let short = record(
        "poor",
        Category::Airtime,
        airtime_fields(dec!(500)),
        ScheduleStatus::Pending,
        an_hour_ago(),
    );
    h.store.insert_schedule(ok.clone()).await;
    h.store.insert_schedule(short.clone()).await;

    let recording = Arc::new(RecordingSchedules::new(Arc::new(h.store.clone())));
    worker(&h, recording.clone()).run_cycle().await.unwrap();

    let calls = recording.calls();
    for id in [ok.id, short.id] {
        let steps: Vec<&str> = calls
            .iter()
            .filter(|(_, call_id)| *call_id == id)
            .map(|(step, _)| *step)
            .collect();
        assert_eq!(steps.len(), 2, "steps for {}: {:?}", id, steps);
        assert_eq!(steps[0], "claim");
    }
    assert_eq!(
        h.store.get(ok.id).await.unwrap().unwrap().status,
        ScheduleStatus::Completed
    );
    assert_eq!(
        h.store.get(short.id).await.unwrap().unwrap().status,
        ScheduleStatus::Failed
    );
}

#[tokio::test]
async fn store_refuses_to_skip_processing() {
    let h = Harness::new();
    let pending = record(
        "u1",
        Category::Data,
        data_fields(dec!(500)),
        ScheduleStatus::Pending,
        an_hour_ago(),
    );
    h.store.insert_schedule(pending.clone()).await;

    assert!(!h.store.complete(pending.id).await.unwrap());
    assert!(!h.store.fail(pending.id, "boom").await.unwrap());
    assert_eq!(
        h.store.get(pending.id).await.unwrap().unwrap().status,
        ScheduleStatus::Pending
    );
}

#[tokio::test]
async fn batch_size_caps_a_cycle() {
    let h = Harness::new();
    h.fund("u1", dec!(100000)).await;
    for _ in 0..12 {
        h.store
            .insert_schedule(record(
                "u1",
                Category::Data,
                data_fields(dec!(500)),
                ScheduleStatus::Pending,
                an_hour_ago(),
            ))
            .await;
    }

    let w = worker(&h, Arc::new(h.store.clone()));
    let first = w.run_cycle().await.unwrap();
    let second = w.run_cycle().await.unwrap();

    assert_eq!(first.due, 10);
    assert_eq!(first.completed, 10);
    assert_eq!(second.due, 2);
    assert_eq!(h.provider_b.executions(), 12);
}

#[tokio::test]
async fn worker_stops_on_shutdown_signal() {
    let h = Harness::new();
    h.fund("u1", dec!(1000)).await;
    h.store
        .insert_schedule(record(
            "u1",
            Category::Data,
            data_fields(dec!(500)),
            ScheduleStatus::Pending,
            an_hour_ago(),
        ))
        .await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(worker(&h, Arc::new(h.store.clone())).run(rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();

    assert_eq!(h.store.balance("u1").await, Some(dec!(500)));
}

#[tokio::test]
async fn worker_stops_when_the_shutdown_sender_is_dropped() {
    let h = Harness::new();
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(worker(&h, Arc::new(h.store.clone())).run(rx));

    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker kept running without a shutdown sender")
        .unwrap();
}

#[tokio::test]
async fn created_schedule_is_pending_until_due() {
    let h = Harness::new();
    let created = h
        .store
        .create(NewScheduledTransaction {
            user_id: "u1".to_string(),
            category: Category::Data,
            request_fields: data_fields(dec!(500)),
            scheduled_time: Utc::now() + ChronoDuration::minutes(5),
        })
        .await
        .unwrap();

    assert_eq!(created.status, ScheduleStatus::Pending);
    assert!(!created.is_due(Utc::now()));
    assert!(created.is_due(Utc::now() + ChronoDuration::minutes(10)));
}
