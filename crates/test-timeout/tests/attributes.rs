use std::time::Duration;

#[test_timeout::tokio_timeout_test(1, paused)]
async fn paused_clock_can_run_far_past_the_budget() {
    let started = tokio::time::Instant::now();
    tokio::time::sleep(Duration::from_secs(6 * 60 * 60)).await;
    tokio::time::advance(Duration::from_secs(90)).await;
    assert!(started.elapsed() >= Duration::from_secs(6 * 60 * 60 + 90));
}

#[test_timeout::tokio_timeout_test(5)]
async fn real_clock_tests_still_run() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[test_timeout::tokio_timeout_test(1)]
#[should_panic(expected = "test timed out")]
async fn real_clock_budget_is_enforced() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

#[test_timeout::timeout(5)]
fn sync_tests_run_on_a_helper_thread() {
    assert_eq!(2 + 2, 4);
}
