//! Correlation engine benchmark suite.
//!
//! Measures request/reply round trips over the in-memory transport, so the
//! numbers cover framing, correlation and event routing without a browser:
//! - Concurrent requests in flight: 1, 16, 256
//! - Sessions multiplexed over one connection: 1, 8, 64
//! - Event fan-out to listeners: 1, 16
//!
//! Run with: cargo bench --bench correlation
//! Results saved to: target/criterion/

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cdp_driver::transport::memory::{self, RemoteEnd};
use cdp_driver::{Connection, Listener, Session};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::future::try_join_all;
use serde_json::{Value, json};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const IN_FLIGHT: &[usize] = &[1, 16, 256];
const SESSION_COUNTS: &[usize] = &[1, 8, 64];
const LISTENER_COUNTS: &[usize] = &[1, 16];

// ============================================================================
// Fake Browser
// ============================================================================

/// Replies to every request, echoing its `sessionId`. Attach requests get a
/// session id derived from the target id.
fn spawn_echo(rt: &Runtime, mut remote: RemoteEnd) {
    rt.spawn(async move {
        while let Some(request) = remote.next_request().await {
            let result = match request["method"].as_str() {
                Some("Target.attachToTarget") => {
                    json!({"sessionId": format!("S-{}", request["params"]["targetId"].as_str().unwrap_or_default())})
                }
                _ => json!({}),
            };

            let mut reply = json!({"id": request["id"], "result": result});
            if let Some(session_id) = request.get("sessionId") {
                reply["sessionId"] = session_id.clone();
            }
            remote.push(reply);
        }
    });
}

fn echo_connection(rt: &Runtime) -> Connection {
    let (transport, remote) = memory::pair();
    spawn_echo(rt, remote);
    rt.block_on(async { Connection::new(transport) })
}

// ============================================================================
// Benchmark: Concurrent Round Trips
// ============================================================================

fn bench_round_trips(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let connection = echo_connection(&rt);

    let mut group = c.benchmark_group("round_trips");

    for &in_flight in IN_FLIGHT {
        group.throughput(Throughput::Elements(in_flight as u64));
        group.bench_with_input(
            BenchmarkId::new("in_flight", in_flight),
            &in_flight,
            |b, &count| {
                b.to_async(&rt).iter(|| {
                    let connection = connection.clone();
                    async move {
                        let requests =
                            (0..count).map(|_| connection.send("Runtime.evaluate", json!({})));
                        try_join_all(requests).await.expect("replies")
                    }
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Benchmark: Session Multiplexing
// ============================================================================

fn bench_sessions(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("sessions");

    for &session_count in SESSION_COUNTS {
        let connection = echo_connection(&rt);
        let sessions: Vec<Session> = rt.block_on(async {
            let attaches =
                (0..session_count).map(|i| connection.attach_session(format!("T{i}")));
            try_join_all(attaches).await.expect("attach")
        });

        group.throughput(Throughput::Elements(session_count as u64));
        group.bench_with_input(
            BenchmarkId::new("one_request_each", session_count),
            &sessions,
            |b, sessions| {
                b.to_async(&rt).iter(|| async {
                    let requests = sessions
                        .iter()
                        .map(|session| session.send("Page.getFrameTree", json!({})));
                    try_join_all(requests).await.expect("replies")
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Benchmark: Event Fan-out
// ============================================================================

fn bench_event_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_fanout");

    for &listener_count in LISTENER_COUNTS {
        let registry = cdp_driver::EventRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..listener_count {
            let calls = Arc::clone(&calls);
            let listener = Listener::new(move |_: &Value| {
                calls.fetch_add(1, Ordering::Relaxed);
            });
            registry.on("Network.requestWillBeSent", &listener);
        }

        let payload = json!({"requestId": "1000.1", "request": {"url": "https://example.com"}});

        group.bench_with_input(
            BenchmarkId::new("listeners", listener_count),
            &payload,
            |b, payload| {
                b.iter(|| registry.emit("Network.requestWillBeSent", payload));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_round_trips,
    bench_sessions,
    bench_event_fanout
);
criterion_main!(benches);
