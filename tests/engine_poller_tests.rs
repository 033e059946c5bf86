mod common;

use acqsource::hal::AcquisitionDriver;
use acqsource::source::EnablementState;
use acqsource::AdapterConfig;
use common::{adapter_with, small_profile};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

fn fast_config() -> AdapterConfig {
    AdapterConfig {
        poll_interval_ms: 10,
        ..AdapterConfig::for_source("Rhythm FPGA")
    }
}

async fn wait_for_state(
    check: impl Fn() -> EnablementState,
    expected: EnablementState,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() == expected {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_poller_arms_present_source() {
    let (adapter, _driver, host) = adapter_with(small_profile(), fast_config());
    let control = adapter.control();

    let poller = control.spawn_poller().expect("driver attached");
    assert!(wait_for_state(|| control.state(), EnablementState::Enabled).await);

    timeout(Duration::from_secs(1), poller.shutdown())
        .await
        .expect("poller shutdown timed out");
    assert_eq!(host.shown(), vec![EnablementState::Enabled]);
}

#[tokio::test]
async fn test_poller_tracks_hot_plug() {
    let (adapter, driver, host) = adapter_with(small_profile(), fast_config());
    let control = adapter.control();
    let switch = driver.presence_switch();
    switch.set_present(false);

    let poller = control.spawn_poller().unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(control.state(), EnablementState::Searching);

    switch.set_present(true);
    assert!(wait_for_state(|| control.state(), EnablementState::Enabled).await);

    switch.set_present(false);
    assert!(wait_for_state(|| control.state(), EnablementState::Disabled).await);

    poller.shutdown().await;
    assert_eq!(
        host.shown(),
        vec![EnablementState::Enabled, EnablementState::Disabled]
    );
}

#[tokio::test]
async fn test_polling_pauses_during_acquisition() {
    let (adapter, driver, host) = adapter_with(small_profile(), fast_config());
    let control = adapter.control();

    let poller = control.spawn_poller().unwrap();
    assert!(wait_for_state(|| control.state(), EnablementState::Enabled).await);

    let enabled = tokio::task::spawn_blocking({
        let control = control.clone();
        move || control.enable()
    })
    .await
    .unwrap();
    assert!(enabled);
    assert!(!control.enablement().polling_active());

    // Acquisition owns the source; the timer leaves it alone
    sleep(Duration::from_millis(50)).await;
    assert_eq!(control.state(), EnablementState::Enabled);
    assert_eq!(host.shown().len(), 1);

    let stopper = control.clone();
    tokio_test::assert_ok!(tokio::task::spawn_blocking(move || stopper.disable()).await);
    assert!(!driver.is_running());
    assert!(control.enablement().polling_active());

    // Polling restarted and re-arms the still-present source
    assert!(wait_for_state(|| control.state(), EnablementState::Enabled).await);
    assert_eq!(
        host.shown(),
        vec![EnablementState::Enabled, EnablementState::Enabled]
    );

    poller.shutdown().await;
}

#[tokio::test]
async fn test_dropped_poller_stops_polling() {
    let (adapter, driver, _host) = adapter_with(small_profile(), fast_config());
    let control = adapter.control();
    driver.presence_switch().set_present(false);

    let poller = control.spawn_poller().unwrap();
    sleep(Duration::from_millis(30)).await;
    drop(poller);

    driver.presence_switch().set_present(true);
    sleep(Duration::from_millis(60)).await;
    assert_eq!(control.state(), EnablementState::Searching);
}
