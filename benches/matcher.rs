use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vcr_proxy::fingerprint::fingerprint_request;
use vcr_proxy::matcher::MatchStrategy;
use vcr_proxy::storage::{Headers, Interaction, RecordedRequest, RecordedResponse, Status};

const ROUTE: &str = "https://lt.example.org/node_agent2/node_agent";

fn legacy_body(device: usize, padding: usize) -> Bytes {
    Bytes::from(format!(
        "<cmd>mode=&quot;execute&quot; &lt;Device name=&quot;dev{device}&quot; {}</cmd>",
        "x".repeat(padding)
    ))
}

fn cassette(size: usize, padding: usize) -> Vec<Interaction> {
    (0..size)
        .map(|i| {
            Interaction::new(
                RecordedRequest::new("POST", ROUTE, Headers::new(), legacy_body(i, padding)),
                RecordedResponse {
                    status: Status {
                        code: 200,
                        message: "OK".to_string(),
                    },
                    headers: Headers::new(),
                    body: Bytes::from_static(b"<ack/>"),
                },
            )
        })
        .collect()
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_last");

    for size in [10, 100, 1_000] {
        let interactions = cassette(size, 512);
        let incoming = RecordedRequest::new("POST", ROUTE, Headers::new(), legacy_body(size - 1, 512));

        for strategy in [MatchStrategy::Strict, MatchStrategy::LegacyProtocol] {
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), size),
                &interactions,
                |b, interactions| {
                    b.iter(|| strategy.find(black_box(&incoming), black_box(interactions)));
                },
            );
        }
    }

    group.finish();
}

fn bench_fingerprint_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let request = RecordedRequest::new("POST", ROUTE, Headers::new(), Bytes::from(vec![b'x'; size]));
            b.iter(|| fingerprint_request(black_box(&request)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_find, bench_fingerprint_sizes);
criterion_main!(benches);
