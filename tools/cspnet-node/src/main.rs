// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! cspnet node
//!
//! Runs one node on a TCP link server and drives a single primitive on it.
//!
//! # Usage
//!
//! ```bash
//! # Read lines from a channel input at handle 50
//! cspnet-node --port 7890 serve
//!
//! # Write to it from another host, then poison the channel
//! cspnet-node send --to 'ncl://<node id>/50' --poison 1 hello world
//!
//! # Barrier server with 2 local participants and 1 remote client end
//! cspnet-node --port 7891 barrier-serve --local 2 --remote 1 --rounds 10
//! cspnet-node barrier-sync --server 'nbl://<node id>/50' --rounds 10
//!
//! # Upper-casing connection server and a client
//! cspnet-node --port 7892 echo
//! cspnet-node request --to 'nconnl://<node id>/50' one two three
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use cspnet::{
    BarrierLocation, ChannelLocation, ConnectionLocation, Error as NetError, InputOptions,
    NetBarrier, NetConnectionServer, Node, Utf8Codec,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::ToolConfig;

/// Networked CSP node
#[derive(Parser, Debug)]
#[command(name = "cspnet-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Node name embedded in the node id
    #[arg(short, long)]
    name: Option<String>,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long)]
    bind: Option<String>,

    /// Link server port (0 picks a free one)
    #[arg(short, long)]
    port: Option<u16>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read and print strings from a channel input until it is poisoned
    Serve {
        /// Ignore poison up to this strength
        #[arg(long, default_value = "0")]
        immunity: i32,
    },
    /// Write strings to a remote channel input
    Send {
        /// Channel location (ncl://...)
        #[arg(long)]
        to: String,
        /// Poison the channel with this strength after writing
        #[arg(long)]
        poison: Option<i32>,
        /// Messages to write
        messages: Vec<String>,
    },
    /// Run a barrier server end
    BarrierServe {
        /// Local participants
        #[arg(long, default_value = "1")]
        local: usize,
        /// Remote client ends expected up front
        #[arg(long, default_value = "1")]
        remote: usize,
        /// Sync rounds per participant
        #[arg(long, default_value = "1")]
        rounds: usize,
    },
    /// Run a barrier client end
    BarrierSync {
        /// Barrier server location (nbl://...)
        #[arg(long)]
        server: String,
        /// Local participants
        #[arg(long, default_value = "1")]
        local: usize,
        /// Sync rounds per participant
        #[arg(long, default_value = "1")]
        rounds: usize,
    },
    /// Serve a connection that answers each request in upper case
    Echo,
    /// Send requests over one connection session
    Request {
        /// Connection server location (nconnl://...)
        #[arg(long)]
        to: String,
        /// Requests to send; the server closes the session after the last
        requests: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // try_init also forwards the library's `log` records.
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;

    let mut config = if let Some(path) = &args.config {
        info!("Loading config from {:?}", path);
        ToolConfig::from_file(path)?
    } else {
        ToolConfig::default()
    };
    if let Some(name) = args.name {
        config.node.name = name;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind.parse()?;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    let node = Node::bind_tcp(config.node.clone(), config.bind())?;
    info!("node {} listening on {:?}", node.id(), node.local_addr());

    match args.command {
        Command::Serve { immunity } => serve(&node, &config, immunity)?,
        Command::Send { to, poison, messages } => send(&node, &to, poison, &messages)?,
        Command::BarrierServe {
            local,
            remote,
            rounds,
        } => {
            let barrier = node.numbered_barrier_server(config.handle, local, remote)?;
            println!("{}", barrier.location());
            run_barrier(barrier, local, rounds)?;
        }
        Command::BarrierSync {
            server,
            local,
            rounds,
        } => {
            let server: BarrierLocation = server.parse()?;
            let barrier = node.barrier_client(&server, local)?;
            run_barrier(barrier, local, rounds)?;
        }
        Command::Echo => echo(&node, &config)?,
        Command::Request { to, requests } => request(&node, &to, &requests)?,
    }

    node.shutdown();
    Ok(())
}

fn serve(node: &Node, config: &ToolConfig, immunity: i32) -> cspnet::Result<()> {
    let options = InputOptions::default().handle(config.handle).immunity(immunity);
    let mut input = node.net2one_with(options, Utf8Codec)?;
    println!("{}", input.location());

    loop {
        match input.read() {
            Ok(line) => println!("{}", line),
            Err(NetError::Poisoned(strength)) => {
                info!("channel poisoned (strength {})", strength);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

fn send(node: &Node, to: &str, poison: Option<i32>, messages: &[String]) -> cspnet::Result<()> {
    let target: ChannelLocation = to.parse()?;
    let mut output = node.one2net(&target, Utf8Codec)?;
    for message in messages {
        output.write(message)?;
    }
    if let Some(strength) = poison {
        output.poison(strength);
    }
    info!("{} message(s) delivered to {}", messages.len(), target);
    Ok(())
}

fn run_barrier(barrier: NetBarrier, local: usize, rounds: usize) -> cspnet::Result<()> {
    let barrier = Arc::new(barrier);
    let participants: Vec<_> = (0..local)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> cspnet::Result<()> {
                for round in 0..rounds {
                    barrier.sync()?;
                    info!("participant {} passed round {}", id, round);
                }
                Ok(())
            })
        })
        .collect();

    let mut outcome = Ok(());
    for participant in participants {
        match participant.join() {
            Ok(Err(e)) => {
                warn!("participant failed: {}", e);
                outcome = Err(e);
            }
            Ok(Ok(())) => {}
            Err(_) => warn!("participant thread panicked"),
        }
    }
    outcome
}

fn echo(node: &Node, config: &ToolConfig) -> cspnet::Result<()> {
    let mut server = node.numbered_connection_server::<String, String, _>(config.handle, Utf8Codec)?;
    println!("{}", server.location());

    loop {
        let request = match server.request() {
            Ok(request) => request,
            Err(e @ (NetError::LinkLost | NetError::Rejected(_))) => {
                warn!("client lost: {}", e);
                continue;
            }
            Err(NetError::Corrupted(reason)) => {
                // A reply is still owed; close the session with an empty one.
                warn!("undecodable request: {}", reason);
                close_undecodable(&mut server);
                continue;
            }
            Err(e) => return Err(e),
        };
        info!("request {:?}", request);
        let answer = request.to_uppercase();
        let sent = if request.is_empty() {
            server.reply_and_close(&answer)
        } else {
            server.reply(&answer)
        };
        if let Err(e) = sent {
            warn!("reply failed: {}", e);
        }
    }
}

/// Close the session after a request that could not be decoded.
///
/// Returns false (after logging) when the close itself fails.
fn close_undecodable(server: &mut NetConnectionServer<String, String, Utf8Codec>) -> bool {
    match server.reply_and_close(&String::new()) {
        Ok(()) => true,
        Err(e) => {
            warn!("close after undecodable request failed: {}", e);
            false
        }
    }
}

fn request(node: &Node, to: &str, requests: &[String]) -> cspnet::Result<()> {
    let server: ConnectionLocation = to.parse()?;
    let mut client = node.connection_client::<String, String, _>(&server, Utf8Codec)?;
    // The empty request asks the server to close the session.
    for request in requests.iter().map(String::as_str).chain([""]) {
        client.request(&request.to_string())?;
        let reply = client.reply()?;
        if !request.is_empty() {
            println!("{}", reply);
        }
    }
    info!("session open after last request: {}", client.is_open());
    Ok(())
}
