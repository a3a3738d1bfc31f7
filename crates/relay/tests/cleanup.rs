#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::{sync::Arc, time::Duration};

use {
    common::{Harness, OWNER},
    relaydesk_common::{Content, OperatorId, UserId},
    relaydesk_relay::CleanupScheduler,
};

async fn bind_and_go_idle(h: &Harness) {
    h.engine
        .on_user_message(&h.user(7), &Content::text("hi"))
        .await
        .unwrap();
    h.engine.router().bind(OperatorId(OWNER), UserId(7), h.now());
    h.advance_ms(31 * 60 * 1_000);
}

#[tokio::test(start_paused = true)]
async fn scheduler_sweeps_on_each_tick() {
    let h = Harness::new();
    bind_and_go_idle(&h).await;

    let scheduler = CleanupScheduler::new(Arc::clone(&h.engine), Duration::from_secs(60));
    scheduler.start();
    assert!(scheduler.is_running());

    // Nothing happens before the first full interval.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.engine.router().count_bound(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.engine.router().count_bound(), 0);
    assert_eq!(h.engine.sessions().count_active(), 1);

    h.advance_ms(24 * 60 * 60 * 1_000);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.engine.sessions().count_active(), 0);

    scheduler.stop().await;
    assert!(!scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn stopped_scheduler_no_longer_sweeps() {
    let h = Harness::new();
    let scheduler = CleanupScheduler::new(Arc::clone(&h.engine), Duration::from_secs(60));
    scheduler.start();
    scheduler.stop().await;

    bind_and_go_idle(&h).await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.engine.router().count_bound(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_and_stop_are_idempotent() {
    let h = Harness::new();
    let scheduler = CleanupScheduler::new(Arc::clone(&h.engine), Duration::from_secs(1));

    scheduler.stop().await;
    scheduler.start();
    scheduler.start();
    assert!(scheduler.is_running());

    scheduler.stop().await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());

    scheduler.start();
    assert!(scheduler.is_running());
    scheduler.stop().await;
}
