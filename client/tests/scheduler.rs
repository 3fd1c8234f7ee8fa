mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use timestore_client::mock::{MockProvider, MOCK_ACCOUNT};
use timestore_client::{FetchError, MessageBoard, PollHandle, PollScheduler, ScheduleError};
use timestore_common::config::REFRESH_MINUTES;
use tokio::time::{sleep, Instant};

use common::{connect, msg};

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn ticks_immediately_then_every_interval() {
    let mock = MockProvider::new();
    mock.set_block_time(100);
    mock.seed(MOCK_ACCOUNT, "hi", 50);
    let client = connect(&mock).await;

    let start = Instant::now();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = PollScheduler::start(client, REFRESH_MINUTES, move |msgs| {
        sink.lock().unwrap().push((start.elapsed().as_secs(), msgs));
    })
    .unwrap();

    sleep(10 * MINUTE + Duration::from_secs(1)).await;

    let seen = seen.lock().unwrap();
    let offsets: Vec<u64> = seen.iter().map(|(t, _)| *t).collect();
    assert_eq!(offsets, vec![0, 300, 600]);
    assert!(seen.iter().all(|(_, m)| *m == vec![msg(1, 50, "hi")]));
    assert_eq!(mock.call_count(), 3);
    assert_eq!(handle.status().ticks, 3);
    assert_eq!(handle.schedule().interval_minutes, REFRESH_MINUTES);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_polling_and_is_idempotent() {
    let mock = MockProvider::new();
    let client = connect(&mock).await;
    let ticks = Arc::new(Mutex::new(0u32));
    let counter = ticks.clone();
    let mut handle = PollScheduler::start(client, 5, move |_| {
        *counter.lock().unwrap() += 1;
    })
    .unwrap();

    sleep(6 * MINUTE).await;
    assert_eq!(*ticks.lock().unwrap(), 2);

    PollScheduler::stop(&mut handle);
    assert!(!handle.is_running());
    handle.stop();

    sleep(30 * MINUTE).await;
    assert_eq!(*ticks.lock().unwrap(), 2);
    assert_eq!(mock.call_count(), 2);
}

/// A failed tick is reported and the next attempt waits for the next tick.
#[tokio::test(start_paused = true)]
async fn failed_tick_waits_for_next_interval() {
    let mock = MockProvider::new();
    mock.set_fail_calls(true);
    let client = connect(&mock).await;
    let ticks = Arc::new(Mutex::new(0u32));
    let counter = ticks.clone();
    let handle = PollScheduler::start(client, 5, move |_| {
        *counter.lock().unwrap() += 1;
    })
    .unwrap();

    sleep(Duration::from_secs(1)).await;
    let status = handle.status();
    assert_eq!(status.ticks, 1);
    assert!(matches!(status.last_error, Some(FetchError::RemoteUnavailable(_))));
    assert_eq!(*ticks.lock().unwrap(), 0);

    sleep(4 * MINUTE).await;
    assert_eq!(mock.call_count(), 1);

    mock.set_fail_calls(false);
    sleep(MINUTE).await;
    assert_eq!(mock.call_count(), 2);
    assert_eq!(*ticks.lock().unwrap(), 1);
    assert_eq!(handle.status().last_error, None);
}

/// A fetch slower than the interval makes the scheduler drop the tick that
/// came due meanwhile rather than start a second request.
#[tokio::test(start_paused = true)]
async fn slow_fetch_skips_overlapping_tick() {
    let mock = MockProvider::new();
    mock.set_call_delay(7 * MINUTE);
    let client = connect(&mock).await;
    let handle = PollScheduler::start(client, 5, |_| {}).unwrap();

    sleep(16 * MINUTE).await;
    assert_eq!(mock.call_count(), 2);
    assert_eq!(mock.max_in_flight(), 1);
    let status = handle.status();
    assert_eq!(status.skipped, 1);
    assert_eq!(status.ticks, 1);
}

/// Seconds from now until the published next refresh.
fn seconds_until_next_refresh(handle: &PollHandle) -> i64 {
    (handle.schedule().next_refresh_at - Utc::now()).num_seconds()
}

/// The published next refresh is the next tick of the grid, not one full
/// interval after a slow fetch finished.
#[tokio::test(start_paused = true)]
async fn next_refresh_follows_tick_grid() {
    let mock = MockProvider::new();
    mock.set_call_delay(2 * MINUTE);
    let client = connect(&mock).await;
    let handle = PollScheduler::start(client, 5, |_| {}).unwrap();

    sleep(2 * MINUTE + Duration::from_secs(1)).await;
    let remaining = seconds_until_next_refresh(&handle);
    assert!((170..=180).contains(&remaining), "next refresh in {remaining}s");

    sleep(3 * MINUTE).await;
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn next_refresh_after_skip_is_next_grid_tick() {
    let mock = MockProvider::new();
    mock.set_call_delay(7 * MINUTE);
    let client = connect(&mock).await;
    let handle = PollScheduler::start(client, 5, |_| {}).unwrap();

    sleep(7 * MINUTE + Duration::from_secs(1)).await;
    let remaining = seconds_until_next_refresh(&handle);
    assert!((170..=180).contains(&remaining), "next refresh in {remaining}s");
    assert_eq!(handle.status().skipped, 1);
}

/// `on_tick` may stop its own scheduler through a shared handle.
#[tokio::test(start_paused = true)]
async fn stop_from_inside_callback() {
    let mock = MockProvider::new();
    let client = connect(&mock).await;
    let slot: Arc<Mutex<Option<PollHandle>>> = Arc::new(Mutex::new(None));
    let ticks = Arc::new(Mutex::new(0u32));

    let (inner_slot, counter) = (slot.clone(), ticks.clone());
    let handle = PollScheduler::start(client, 5, move |_| {
        *counter.lock().unwrap() += 1;
        if let Some(mut handle) = inner_slot.lock().unwrap().take() {
            handle.stop();
        }
    })
    .unwrap();
    *slot.lock().unwrap() = Some(handle);

    sleep(20 * MINUTE).await;
    assert_eq!(*ticks.lock().unwrap(), 1);
    assert_eq!(mock.call_count(), 1);
    assert!(slot.lock().unwrap().is_none());
}

/// Stopping mid-fetch abandons the call without leaving it counted as in
/// flight.
#[tokio::test(start_paused = true)]
async fn stop_during_fetch_releases_call() {
    let mock = MockProvider::new();
    mock.set_call_delay(2 * MINUTE);
    let client = connect(&mock).await;
    let mut handle = PollScheduler::start(client.clone(), 5, |_| {}).unwrap();

    sleep(MINUTE).await;
    handle.stop();
    sleep(Duration::from_secs(1)).await;

    client.fetch_all().await.unwrap();
    assert_eq!(mock.call_count(), 2);
    assert_eq!(mock.max_in_flight(), 1);
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let mock = MockProvider::new();
    let client = connect(&mock).await;
    let err = PollScheduler::start(client, 0, |_| {}).unwrap_err();
    assert_eq!(err, ScheduleError::ZeroInterval);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_polling() {
    let mock = MockProvider::new();
    let client = connect(&mock).await;
    let handle = PollScheduler::start(client, 5, |_| {}).unwrap();

    sleep(Duration::from_secs(1)).await;
    drop(handle);
    sleep(20 * MINUTE).await;
    assert_eq!(mock.call_count(), 1);
}

/// A manual refresh issued while a tick is fetching does not run alongside
/// it, and both results land on the board.
#[tokio::test(start_paused = true)]
async fn manual_refresh_serializes_with_tick() {
    let mock = MockProvider::new();
    mock.set_block_time(100);
    mock.seed(MOCK_ACCOUNT, "hi", 1);
    mock.set_call_delay(Duration::from_secs(2));
    let client = connect(&mock).await;
    let board = MessageBoard::new();

    let tick_board = board.clone();
    let _handle = PollScheduler::start(client.clone(), 5, move |msgs| {
        tick_board.apply(msgs);
    })
    .unwrap();

    let manual = client.fetch_unlocked().await.unwrap();
    board.apply(manual);
    sleep(Duration::from_secs(10)).await;

    let state = board.snapshot();
    assert_eq!(state.revision, 2);
    assert_eq!(state.messages, vec![msg(1, 1, "hi")]);
    assert_eq!(mock.call_count(), 2);
    assert_eq!(mock.max_in_flight(), 1);
}
