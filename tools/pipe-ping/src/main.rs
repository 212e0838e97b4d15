//! pipe-ping: round-trip requests between two routers joined by an
//! in-memory pipe.
//!
//! One router echoes every request it receives; the other issues `--count`
//! calls and reports the round-trip times. With `--close-peer` the echo side
//! is closed afterwards and one more call shows how the failure surfaces.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

use pipe_router::{IncomingReceiver, MemoryPipe, PipeConfig, ResponseSink, Router, RouterConfig};
use pipe_telemetry::{init_tracing, TelemetryConfig};
use pipe_types::Message;

/// Method ordinal used for ping requests.
const PING: u32 = 1;

/// Round-trip requests over an in-memory router pair
#[derive(Parser, Debug)]
#[command(name = "pipe-ping")]
#[command(about = "Ping/pong over an in-memory message pipe")]
struct Args {
    /// Number of requests to send
    #[arg(short, long, default_value = "4")]
    count: u32,

    /// Payload carried by each request
    #[arg(short, long, default_value = "ping")]
    payload: String,

    /// Seconds to wait for each response
    #[arg(short, long, default_value = "5")]
    timeout: u64,

    /// Close the echo side afterwards and send one more request
    #[arg(long)]
    close_peer: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Answers every request with its own name and payload.
struct Echo;

impl IncomingReceiver for Echo {
    fn accept(&self, message: Message) -> bool {
        debug!(name = message.name(), "One-way message ignored");
        true
    }

    fn accept_with_responder(&self, message: Message, responder: ResponseSink) -> bool {
        let reply = Message::new(message.name(), message.payload().to_vec());
        responder.respond(reply)
    }
}

#[derive(Debug, Serialize)]
struct Report {
    count: u32,
    payload_bytes: usize,
    round_trips_us: Vec<u128>,
    issued: u64,
    completed: u64,
    rejected: u64,
    unmatched: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    after_close: Option<String>,
}

impl Report {
    fn print_text(&self) {
        for (seq, micros) in self.round_trips_us.iter().enumerate() {
            println!("{} bytes: seq={} time={}us", self.payload_bytes, seq + 1, micros);
        }
        println!(
            "--- {} requests, {} completed, {} rejected, {} unmatched ---",
            self.issued, self.completed, self.rejected, self.unmatched
        );
        if let Some(error) = &self.after_close {
            println!("after peer close: {error}");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&TelemetryConfig::from_env().with_service_name("pipe-ping"))
        .context("failed to initialize tracing")?;

    let (client_end, server_end) = MemoryPipe::pair_with_config(PipeConfig::from_env());
    let client = Router::with_config(client_end, RouterConfig::from_env());
    let server = Router::with_receiver(server_end, RouterConfig::default(), Echo);

    let wait = Duration::from_secs(args.timeout);
    let mut round_trips_us = Vec::with_capacity(args.count as usize);

    for seq in 1..=args.count {
        let started = Instant::now();
        let request = Message::new(PING, args.payload.as_bytes().to_vec());
        let response = tokio::time::timeout(wait, client.call(request))
            .await
            .with_context(|| format!("request {seq} timed out"))?
            .with_context(|| format!("request {seq} failed"))?;

        if response.payload() != args.payload.as_bytes() {
            bail!("request {seq} came back with a different payload");
        }
        round_trips_us.push(started.elapsed().as_micros());
    }

    let after_close = if args.close_peer {
        server.close();
        let outcome = tokio::time::timeout(wait, client.call(Message::new(PING, Vec::new())))
            .await
            .context("request after peer close timed out")?;
        match outcome {
            Ok(_) => bail!("request after peer close unexpectedly succeeded"),
            Err(error) => Some(error.to_string()),
        }
    } else {
        None
    };

    let stats = client.stats();
    let report = Report {
        count: args.count,
        payload_bytes: args.payload.len(),
        round_trips_us,
        issued: stats.total_issued.load(Ordering::Relaxed),
        completed: stats.total_completed.load(Ordering::Relaxed),
        rejected: stats.total_rejected.load(Ordering::Relaxed),
        unmatched: stats.total_unmatched.load(Ordering::Relaxed),
        after_close,
    };
    info!(issued = report.issued, completed = report.completed, "Ping finished");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_text();
    }

    client.close();
    server.close();
    Ok(())
}
