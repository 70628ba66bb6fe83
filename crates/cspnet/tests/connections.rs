// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Request/reply connection integration tests.

use std::thread;

use cspnet::{Codec, ConnectionLocation, ConnectionState, Error, JsonCodec, Node};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// JSON codec that refuses to encode the request `"bad"`.
struct Picky;

impl Codec<String> for Picky {
    fn encode(&mut self, value: &String) -> cspnet::Result<Vec<u8>> {
        if value == "bad" {
            return Err(Error::Corrupted("refused".into()));
        }
        Codec::<String>::encode(&mut JsonCodec, value)
    }

    fn decode(&mut self, bytes: &[u8]) -> cspnet::Result<String> {
        Codec::<String>::decode(&mut JsonCodec, bytes)
    }
}

impl Codec<u64> for Picky {
    fn encode(&mut self, value: &u64) -> cspnet::Result<Vec<u8>> {
        Codec::<u64>::encode(&mut JsonCodec, value)
    }

    fn decode(&mut self, bytes: &[u8]) -> cspnet::Result<u64> {
        Codec::<u64>::decode(&mut JsonCodec, bytes)
    }
}

/// Serves `sessions` sessions of two requests each, answering the length.
fn spawn_length_server(
    mut server: cspnet::NetConnectionServer<String, u64, JsonCodec>,
    sessions: usize,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for _ in 0..sessions {
            let first = server.request().unwrap();
            server.reply(&(first.len() as u64)).unwrap();
            assert_eq!(server.state(), ConnectionState::ServerOpen);

            let second = server.request().unwrap();
            server.reply_and_close(&(second.len() as u64)).unwrap();
            assert_eq!(server.state(), ConnectionState::ServerClosed);
            assert!(!server.is_open());
        }
    })
}

#[test]
fn local_session_opens_and_closes() {
    init_logging();
    let node = Node::loopback("conn_local").unwrap();
    let server = node.connection_server::<String, u64, _>(JsonCodec).unwrap();
    let location = server.location().clone();
    let serving = spawn_length_server(server, 1);

    let mut client = node
        .connection_client::<String, u64, _>(&location, JsonCodec)
        .unwrap();
    client.request(&"hello".to_string()).unwrap();
    assert_eq!(client.reply().unwrap(), 5);
    assert!(client.is_open());

    client.request(&"ab".to_string()).unwrap();
    assert_eq!(client.reply().unwrap(), 2);
    assert!(!client.is_open());
    assert_eq!(client.state(), ConnectionState::ClientClosed);

    serving.join().unwrap();
}

#[test]
fn remote_clients_take_turns() {
    init_logging();
    let a = Node::loopback("conn_a").unwrap();
    let b = Node::loopback("conn_b").unwrap();
    Node::attach_loopback(&a, &b).unwrap();

    let server = a.numbered_connection_server::<String, u64, _>(60, JsonCodec).unwrap();
    assert_eq!(server.location().handle(), 60);
    let location = server.location().clone();
    let serving = spawn_length_server(server, 2);

    let clients: Vec<_> = ["one", "three"]
        .into_iter()
        .map(|word| {
            let mut client = b
                .connection_client::<String, u64, _>(&location, JsonCodec)
                .unwrap();
            thread::spawn(move || {
                client.request(&word.to_string()).unwrap();
                let first = client.reply().unwrap();
                client.request(&"xyz".to_string()).unwrap();
                let second = client.reply().unwrap();
                (word.len() as u64, first, second)
            })
        })
        .collect();

    for c in clients {
        let (expected, first, second) = c.join().unwrap();
        assert_eq!(first, expected);
        assert_eq!(second, 3);
    }
    serving.join().unwrap();
}

#[test]
fn reply_before_request_is_misuse() {
    let node = Node::loopback("conn_misuse").unwrap();
    let mut server = node.connection_server::<String, u64, _>(JsonCodec).unwrap();
    let mut client = node
        .connection_client::<String, u64, _>(server.location(), JsonCodec)
        .unwrap();

    assert!(matches!(client.reply(), Err(Error::ProtocolMisuse(_))));
    assert!(matches!(server.reply(&1), Err(Error::ProtocolMisuse(_))));
    assert!(matches!(
        server.reply_and_close(&1),
        Err(Error::ProtocolMisuse(_))
    ));
}

#[test]
fn open_to_missing_server_is_rejected() {
    let node = Node::loopback("conn_missing").unwrap();
    let location = ConnectionLocation::new(node.id().clone(), 999);
    let mut client = node
        .connection_client::<String, u64, _>(&location, JsonCodec)
        .unwrap();

    assert!(matches!(
        client.request(&"anyone?".to_string()),
        Err(Error::Rejected(_))
    ));
    assert_eq!(client.state(), ConnectionState::Broken);
    assert!(matches!(
        client.request(&"again".to_string()),
        Err(Error::Broken(_))
    ));
}

#[test]
fn abandoned_session_frees_the_server() {
    init_logging();
    let node = Node::loopback("conn_abandon").unwrap();
    let mut server = node.connection_server::<String, u64, _>(JsonCodec).unwrap();
    let location = server.location().clone();

    let first = {
        let mut client = node
            .connection_client::<String, u64, _>(&location, JsonCodec)
            .unwrap();
        thread::spawn(move || {
            client.request(&"bye".to_string()).unwrap();
            client.reply().unwrap()
        })
    };
    assert_eq!(server.request().unwrap(), "bye");
    server.reply(&3).unwrap();
    assert_eq!(first.join().unwrap(), 3);

    // The client was dropped with the session open.
    assert!(matches!(server.request(), Err(Error::Rejected(_))));
    assert_eq!(server.state(), ConnectionState::ServerClosed);

    let mut next = node
        .connection_client::<String, u64, _>(&location, JsonCodec)
        .unwrap();
    let serving = thread::spawn(move || {
        let got = server.request().unwrap();
        server.reply_and_close(&(got.len() as u64)).unwrap();
    });
    next.request(&"hi".to_string()).unwrap();
    assert_eq!(next.reply().unwrap(), 2);
    serving.join().unwrap();
}

#[test]
fn destroyed_server_rejects_waiting_clients() {
    let node = Node::loopback("conn_destroy").unwrap();
    let mut server = node.connection_server::<String, u64, _>(JsonCodec).unwrap();
    let mut client = node
        .connection_client::<String, u64, _>(server.location(), JsonCodec)
        .unwrap();

    let waiting = thread::spawn(move || client.request(&"late".to_string()));
    // The OPEN may land before or after the destroy; both are refused.
    thread::sleep(std::time::Duration::from_millis(20));
    server.destroy();

    assert!(matches!(waiting.join().unwrap(), Err(Error::Rejected(_))));
    assert!(matches!(server.request(), Err(Error::Destroyed)));
}

#[test]
fn failed_encode_leaves_client_usable() {
    init_logging();
    let node = Node::loopback("connencode").unwrap();
    let server = node.connection_server::<String, u64, _>(JsonCodec).unwrap();
    let location = server.location().clone();
    let serving = spawn_length_server(server, 1);

    let mut client = node
        .connection_client::<String, u64, _>(&location, Picky)
        .unwrap();
    assert!(matches!(
        client.request(&"bad".to_string()),
        Err(Error::Corrupted(_))
    ));
    assert_eq!(client.state(), ConnectionState::ClientClosed);

    client.request(&"hello".to_string()).unwrap();
    assert_eq!(client.reply().unwrap(), 5);
    client.request(&"ab".to_string()).unwrap();
    assert_eq!(client.reply().unwrap(), 2);
    serving.join().unwrap();
}

#[test]
fn dropped_bystander_leaves_session_intact() {
    init_logging();
    let node = Node::loopback("connbystander").unwrap();
    let server = node.connection_server::<String, u64, _>(JsonCodec).unwrap();
    let location = server.location().clone();
    let serving = spawn_length_server(server, 1);

    let mut holder = node
        .connection_client::<String, u64, _>(&location, JsonCodec)
        .unwrap();
    holder.request(&"first".to_string()).unwrap();
    assert_eq!(holder.reply().unwrap(), 5);
    assert!(holder.is_open());

    {
        let mut bystander = node
            .connection_client::<String, u64, _>(&location, Picky)
            .unwrap();
        assert!(bystander.request(&"bad".to_string()).is_err());
    }

    holder.request(&"four".to_string()).unwrap();
    assert_eq!(holder.reply().unwrap(), 4);
    assert!(!holder.is_open());
    serving.join().unwrap();
}
