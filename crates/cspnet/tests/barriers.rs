// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Distributed barrier integration tests over local and loopback links.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cspnet::{BarrierState, Error, NetBarrier, Node};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn linked_pair(a: &str, b: &str) -> (Node, Node) {
    let a = Node::loopback(a).unwrap();
    let b = Node::loopback(b).unwrap();
    Node::attach_loopback(&a, &b).unwrap();
    (a, b)
}

fn sync_in_thread(barrier: &Arc<NetBarrier>) -> thread::JoinHandle<cspnet::Result<()>> {
    let barrier = Arc::clone(barrier);
    thread::spawn(move || barrier.sync())
}

#[test]
fn local_participants_release_together() {
    init_logging();
    let node = Node::loopback("barrier_local").unwrap();
    let barrier = Arc::new(node.barrier_server(2, 0).unwrap());
    let passed = Arc::new(AtomicUsize::new(0));

    for _round in 0..3 {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let passed = Arc::clone(&passed);
                thread::spawn(move || {
                    barrier.sync().unwrap();
                    passed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
    assert_eq!(passed.load(Ordering::SeqCst), 6);
}

#[test]
fn single_participant_does_not_block() {
    let node = Node::loopback("barrier_single").unwrap();
    let barrier = node.barrier_server(1, 0).unwrap();
    barrier.sync().unwrap();
    barrier.sync().unwrap();
    assert!(barrier.is_server());
}

#[test]
fn first_arrival_waits_for_the_last() {
    let node = Node::loopback("barrier_wait").unwrap();
    let barrier = Arc::new(node.barrier_server(2, 0).unwrap());
    let early = sync_in_thread(&barrier);

    thread::sleep(Duration::from_millis(50));
    assert!(!early.is_finished());
    barrier.sync().unwrap();
    early.join().unwrap().unwrap();
}

#[test]
fn zero_local_participants_is_invalid() {
    let node = Node::loopback("barrier_zero").unwrap();
    assert!(matches!(
        node.barrier_server(0, 1),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn client_on_the_same_node_syncs_with_server() {
    init_logging();
    let node = Node::loopback("barrier_same_node").unwrap();
    let server = Arc::new(node.barrier_server(1, 1).unwrap());
    let client = Arc::new(node.barrier_client(server.location(), 1).unwrap());
    assert_eq!(client.server_location(), server.location());

    for _ in 0..3 {
        let s = sync_in_thread(&server);
        client.sync().unwrap();
        s.join().unwrap().unwrap();
    }
}

#[test]
fn remote_client_syncs_over_loopback_link() {
    init_logging();
    let (a, b) = linked_pair("barrier_a", "barrier_b");
    let server = Arc::new(a.barrier_server(2, 1).unwrap());
    let client = Arc::new(b.barrier_client(server.location(), 2).unwrap());
    assert_eq!(client.state(), BarrierState::ActiveClient);

    for _ in 0..2 {
        let mut threads = vec![sync_in_thread(&server), sync_in_thread(&server)];
        threads.push(sync_in_thread(&client));
        threads.push(sync_in_thread(&client));
        for t in threads {
            t.join().unwrap().unwrap();
        }
    }
}

#[test]
fn resigned_client_is_no_longer_awaited() {
    init_logging();
    let (a, b) = linked_pair("resign_a", "resign_b");
    let server = a.barrier_server(1, 1).unwrap();
    let client = b.barrier_client(server.location(), 1).unwrap();

    client.resign().unwrap();
    assert_eq!(client.state(), BarrierState::Resigned);
    assert!(matches!(client.sync(), Err(Error::ProtocolMisuse(_))));

    // ENROLL then RESIGN arrive in order; the server ends up alone.
    server.sync().unwrap();
    server.sync().unwrap();

    client.enroll().unwrap();
    assert_eq!(client.state(), BarrierState::ActiveClient);
}

#[test]
fn local_resign_completes_the_cycle() {
    let node = Node::loopback("resign_local").unwrap();
    let barrier = Arc::new(node.barrier_server(2, 0).unwrap());
    let waiting = sync_in_thread(&barrier);

    thread::sleep(Duration::from_millis(20));
    barrier.resign().unwrap();
    waiting.join().unwrap().unwrap();

    // One participant left.
    barrier.sync().unwrap();
}

#[test]
fn resign_during_network_phase_counts_from_next_cycle() {
    init_logging();
    let (a, b) = linked_pair("netresign_a", "netresign_b");
    let server = Arc::new(a.barrier_server(2, 1).unwrap());
    let client = Arc::new(b.barrier_client(server.location(), 1).unwrap());

    // Both local participants arrive; the last one waits on the client.
    let first = sync_in_thread(&server);
    let second = sync_in_thread(&server);
    thread::sleep(Duration::from_millis(50));
    server.resign().unwrap();

    client.sync().unwrap();
    first.join().unwrap().unwrap();
    second.join().unwrap().unwrap();

    // One local participant remains.
    let only = sync_in_thread(&server);
    client.sync().unwrap();
    only.join().unwrap().unwrap();
}

#[test]
fn server_resignation_rejects_clients() {
    init_logging();
    let (a, b) = linked_pair("reject_a", "reject_b");
    let server = a.barrier_server(1, 1).unwrap();
    let client = Arc::new(b.barrier_client(server.location(), 1).unwrap());
    let pending = sync_in_thread(&client);

    thread::sleep(Duration::from_millis(20));
    assert!(matches!(server.resign(), Err(Error::Broken(_))));
    assert_eq!(server.state(), BarrierState::Broken);

    assert!(matches!(pending.join().unwrap(), Err(Error::Rejected(_))));
    assert_eq!(client.state(), BarrierState::Broken);
}

#[test]
fn client_of_missing_server_is_rejected() {
    let (a, b) = linked_pair("nosrv_a", "nosrv_b");
    let location = {
        let server = a.barrier_server(1, 0).unwrap();
        server.location().clone()
    };
    let client = b.barrier_client(&location, 1).unwrap();
    assert!(matches!(client.sync(), Err(Error::Rejected(_))));
    assert!(matches!(client.sync(), Err(Error::Broken(_))));
}

#[test]
fn local_client_needs_a_server_end() {
    let node = Node::loopback("not_a_server").unwrap();
    let server = node.barrier_server(1, 1).unwrap();
    let client = node.barrier_client(server.location(), 1).unwrap();
    assert!(matches!(
        node.barrier_client(client.location(), 1),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn reset_changes_local_participants() {
    let node = Node::loopback("barrier_reset").unwrap();
    let barrier = Arc::new(node.barrier_server(1, 0).unwrap());
    barrier.reset(2).unwrap();

    let other = sync_in_thread(&barrier);
    barrier.sync().unwrap();
    other.join().unwrap().unwrap();
    assert!(matches!(barrier.reset(0), Err(Error::InvalidArgument(_))));
}

#[test]
fn destroyed_barrier_refuses_sync() {
    let node = Node::loopback("barrier_destroy").unwrap();
    let barrier = node.barrier_server(1, 0).unwrap();
    barrier.destroy();
    assert_eq!(barrier.state(), BarrierState::Destroyed);
    assert!(matches!(barrier.sync(), Err(Error::Destroyed)));
}
