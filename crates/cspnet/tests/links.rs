// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Link lifecycle tests: TCP handshake, link reuse and failure propagation.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cspnet::{
    BarrierState, ChannelState, Error, InputOptions, Node, NodeAddress, NodeConfig, Utf8Codec,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tcp_node(name: &str) -> Node {
    Node::bind_tcp(NodeConfig::named(name), "127.0.0.1:0".parse().unwrap()).unwrap()
}

fn write_utf(stream: &mut TcpStream, s: &str) {
    stream.write_all(&(s.len() as u16).to_be_bytes()).unwrap();
    stream.write_all(s.as_bytes()).unwrap();
}

fn read_utf(stream: &mut TcpStream) -> String {
    let mut len = [0u8; 2];
    stream.read_exact(&mut len).unwrap();
    let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
    stream.read_exact(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn channel_over_tcp() {
    init_logging();
    let a = tcp_node("tcp_writer");
    let b = tcp_node("tcp_reader");
    let mut input = b.net2one::<String, _>(Utf8Codec).unwrap();
    let location = input.location().clone();

    let mut output = a.one2net(&location, Utf8Codec).unwrap();
    let writer = thread::spawn(move || {
        output.write(&"over tcp".to_string()).unwrap();
        output.write(&"twice".to_string()).unwrap();
    });

    assert_eq!(input.read().unwrap(), "over tcp");
    assert_eq!(input.read().unwrap(), "twice");
    writer.join().unwrap();

    assert_eq!(a.link_manager().len(), 1);
    assert_eq!(b.link_manager().len(), 1);
}

#[test]
fn existing_link_is_reused_in_both_directions() {
    init_logging();
    let a = tcp_node("reuse_a");
    let b = tcp_node("reuse_b");

    let remote = a.connect(b.id().address()).unwrap();
    assert_eq!(&remote, b.id());
    let first = a.link_to(b.id()).unwrap();
    let again = a.link_to(b.id()).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    // The accepting side registered the same logical link.
    let mut waited = Duration::ZERO;
    while b.link_manager().request_link(a.id()).is_none() && waited < EVENT_TIMEOUT {
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }
    let back = b.link_to(a.id()).unwrap();
    assert_eq!(back.remote_id().as_ref(), Some(a.id()));
    assert_eq!(b.link_manager().len(), 1);
}

#[test]
fn duplicate_handshake_is_answered_exists() {
    init_logging();
    let a = tcp_node("exists_a");
    let b = tcp_node("exists_b");
    a.connect(b.id().address()).unwrap();
    let mut waited = Duration::ZERO;
    while b.link_manager().request_link(a.id()).is_none() && waited < EVENT_TIMEOUT {
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }

    // Pretend to be node a again.
    let mut raw = TcpStream::connect(b.local_addr().unwrap()).unwrap();
    raw.set_read_timeout(Some(EVENT_TIMEOUT)).unwrap();
    write_utf(&mut raw, &a.id().to_string());
    assert_eq!(read_utf(&mut raw), "EXISTS");
    assert_eq!(read_utf(&mut raw), b.id().to_string());
}

#[test]
fn links_to_the_local_node_are_refused() {
    let a = tcp_node("self_link");
    assert!(matches!(a.link_to(a.id()), Err(Error::InvalidArgument(_))));
    assert!(matches!(
        a.connect(a.id().address()),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn unattached_loopback_node_is_unreachable() {
    let a = Node::loopback("lonely").unwrap();
    assert!(matches!(
        a.connect(&NodeAddress::Loopback("nobody".into())),
        Err(Error::Connect(_))
    ));
}

#[test]
fn severed_link_reports_loss_once() {
    init_logging();
    let a = Node::loopback("sever_a").unwrap();
    let b = Node::loopback("sever_b").unwrap();
    let wire = Node::attach_loopback(&a, &b).unwrap();
    let events = a.link_lost_events();

    let mut input = b.net2one::<String, _>(Utf8Codec).unwrap();
    let mut output = a.one2net(input.location(), Utf8Codec).unwrap();
    output.async_write(&"before".to_string()).unwrap();
    assert_eq!(input.read().unwrap(), "before");

    wire.sever();
    assert_eq!(&events.recv_timeout(EVENT_TIMEOUT).unwrap(), b.id());
    assert!(a.link_manager().is_empty());

    assert!(matches!(
        output.write(&"after".to_string()),
        Err(Error::LinkLost)
    ));
    assert_eq!(output.state(), ChannelState::Broken);
    assert!(matches!(
        output.write(&"again".to_string()),
        Err(Error::Broken(_))
    ));
    assert!(events.try_recv().is_err());
}

#[test]
fn remote_writer_learns_of_poison() {
    init_logging();
    let a = Node::loopback("rpoison_a").unwrap();
    let b = Node::loopback("rpoison_b").unwrap();
    Node::attach_loopback(&a, &b).unwrap();

    let mut input = b
        .net2one_with::<String, _>(InputOptions::default().immunity(0), Utf8Codec)
        .unwrap();
    let mut output = a.one2net(input.location(), Utf8Codec).unwrap();

    let (done_tx, done_rx) = crossbeam::channel::bounded(1);
    let writer = thread::spawn(move || {
        let first = output.write(&"blocked".to_string());
        let second = output.write(&"later".to_string());
        done_tx.send((first, second)).unwrap();
    });
    while !input.pending() {
        thread::sleep(Duration::from_millis(1));
    }
    input.poison(7);

    let (first, second) = done_rx.recv_timeout(EVENT_TIMEOUT).unwrap();
    assert!(matches!(first, Err(Error::Poisoned(7))));
    assert!(matches!(second, Err(Error::Poisoned(7))));
    writer.join().unwrap();

    // A fresh writer is answered by the poisoned input straight away.
    let mut late = a.one2net(input.location(), Utf8Codec).unwrap();
    assert!(matches!(
        late.write(&"too late".to_string()),
        Err(Error::Poisoned(7))
    ));
}

#[test]
fn remote_shutdown_is_seen_as_link_loss() {
    init_logging();
    let a = tcp_node("shutdown_a");
    let b = tcp_node("shutdown_b");
    let events = a.link_lost_events();
    a.connect(b.id().address()).unwrap();

    b.shutdown();
    assert_eq!(&events.recv_timeout(EVENT_TIMEOUT).unwrap(), b.id());
}

#[test]
fn barrier_ends_learn_of_link_loss() {
    init_logging();
    let a = Node::loopback("blost_a").unwrap();
    let b = Node::loopback("blost_b").unwrap();
    let wire = Node::attach_loopback(&a, &b).unwrap();
    let events = a.link_lost_events();

    let server = Arc::new(a.barrier_server(1, 1).unwrap());
    let client = b.barrier_client(server.location(), 1).unwrap();

    // One full cycle so the server has seen the client's ENROLL.
    let s = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.sync())
    };
    client.sync().unwrap();
    s.join().unwrap().unwrap();

    wire.sever();
    events.recv_timeout(EVENT_TIMEOUT).unwrap();

    assert!(matches!(client.sync(), Err(Error::LinkLost)));
    assert_eq!(client.state(), BarrierState::Broken);

    // The lost client end no longer counts; the caller keeps its turn.
    assert!(matches!(server.sync(), Err(Error::LinkLost)));
    server.sync().unwrap();
}
