//! Expiry handling across the packet path

mod common;

use common::{balance, endpoint, payment, quiet_peer, Network, Receiver};
use connector::Relation;
use futures::future::join_all;
use ledger_core::BalanceConfig;
use packet_core::ErrorCode;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_slow_peer_times_out() {
    let net = Network::new();
    let a = net.connector("a", Some("test.a"));
    a.add_peer(quiet_peer("alice", Relation::Child), endpoint("alice-wallet", "a"))
        .await
        .unwrap();
    let bob = Receiver::slow(Duration::from_secs(60));
    net.receiver("bob-wallet", bob.clone());
    a.add_peer(quiet_peer("bob", Relation::Child), endpoint("bob-wallet", "a"))
        .await
        .unwrap();

    let reply = a.handle_incoming("alice", payment("test.a.bob", 10)).await;
    assert_eq!(reply.reject_code(), Some(ErrorCode::R00_TRANSFER_TIMED_OUT));
    assert_eq!(bob.received().len(), 1);
    assert_eq!(balance(&a, "alice"), 0);
    assert_eq!(balance(&a, "bob"), 0);
}

#[tokio::test]
async fn test_short_expiry_is_refused() {
    let net = Network::new();
    let a = net.connector("a", Some("test.a"));
    a.add_peer(quiet_peer("alice", Relation::Child), endpoint("alice-wallet", "a"))
        .await
        .unwrap();
    let bob = Receiver::new();
    net.receiver("bob-wallet", bob.clone());
    a.add_peer(quiet_peer("bob", Relation::Child), endpoint("bob-wallet", "a"))
        .await
        .unwrap();

    let mut short = payment("test.a.bob", 10);
    short.expires_at = chrono::Utc::now() + chrono::Duration::milliseconds(500);
    let reply = a.handle_incoming("alice", short).await;
    assert_eq!(reply.reject_code(), Some(ErrorCode::R02_INSUFFICIENT_TIMEOUT));
    assert!(bob.received().is_empty());

    let mut expired = payment("test.a.bob", 10);
    expired.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
    let reply = a.handle_incoming("alice", expired).await;
    assert_eq!(reply.reject_code(), Some(ErrorCode::R00_TRANSFER_TIMED_OUT));
}

#[tokio::test]
async fn test_hold_time_is_capped() {
    let net = Network::new();
    let a = net.connector("a", Some("test.a"));
    a.add_peer(quiet_peer("alice", Relation::Child), endpoint("alice-wallet", "a"))
        .await
        .unwrap();
    let bob = Receiver::new();
    net.receiver("bob-wallet", bob.clone());
    a.add_peer(quiet_peer("bob", Relation::Child), endpoint("bob-wallet", "a"))
        .await
        .unwrap();

    let mut long = payment("test.a.bob", 10);
    long.expires_at = chrono::Utc::now() + chrono::Duration::minutes(10);
    let reply = a.handle_incoming("alice", long).await;
    assert!(reply.is_fulfill());

    let forwarded = &bob.received()[0];
    let held = forwarded.expires_at - chrono::Utc::now();
    assert!(held <= chrono::Duration::seconds(30));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_leaves_other_packets_alone() {
    let net = Network::new();
    let a = net.connector("a", Some("test.a"));
    a.add_peer(quiet_peer("alice", Relation::Child), endpoint("alice-wallet", "a"))
        .await
        .unwrap();
    let bob = Receiver::slow_for("test.a.bob.slow", Duration::from_secs(60));
    net.receiver("bob-wallet", bob.clone());
    a.add_peer(quiet_peer("bob", Relation::Child), endpoint("bob-wallet", "a"))
        .await
        .unwrap();

    let (slow, fast) = tokio::join!(
        a.handle_incoming("alice", payment("test.a.bob.slow", 10)),
        a.handle_incoming("alice", payment("test.a.bob.fast", 7)),
    );

    assert_eq!(slow.reject_code(), Some(ErrorCode::R00_TRANSFER_TIMED_OUT));
    assert!(fast.is_fulfill());
    assert_eq!(bob.received().len(), 2);
    assert_eq!(balance(&a, "alice"), 7);
    assert_eq!(balance(&a, "bob"), -7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fulfills_respect_balance_bounds() {
    let net = Network::new();
    let a = net.connector("a", Some("test.a"));
    a.add_peer(quiet_peer("alice", Relation::Child), endpoint("alice-wallet", "a"))
        .await
        .unwrap();
    net.receiver("bob-wallet", Receiver::new());
    let mut bob = quiet_peer("bob", Relation::Child);
    bob.rules.balance = BalanceConfig::bounded(-95, 1_000);
    a.add_peer(bob, endpoint("bob-wallet", "a")).await.unwrap();

    let sends = (0..20).map(|_| {
        let a = a.clone();
        tokio::spawn(async move { a.handle_incoming("alice", payment("test.a.bob", 10)).await })
    });
    let replies: Vec<_> = join_all(sends)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let fulfilled = replies.iter().filter(|reply| reply.is_fulfill()).count() as i64;
    assert_eq!(fulfilled, 9);
    assert!(replies
        .iter()
        .filter(|reply| !reply.is_fulfill())
        .all(|reply| reply.reject_code() == Some(ErrorCode::T04_INSUFFICIENT_LIQUIDITY)));
    assert_eq!(balance(&a, "bob"), -10 * fulfilled);
    assert_eq!(balance(&a, "alice"), 10 * fulfilled);
    assert!(balance(&a, "bob") >= -95);
}
