//! Criterion benchmarks for the pigpio frame codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package pigpio-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pigpio_core::protocol::messages::HEADER_SIZE;
use pigpio_core::{decode_header, decode_request, encode_request, encode_response, Request, Response};

// ── Request fixtures ──────────────────────────────────────────────────────────

fn fixtures() -> Vec<(&'static str, Request)> {
    vec![
        (
            "SERO",
            Request::OpenPort {
                bit_rate: 115_200,
                flags: 0,
                port_name: "/dev/ttyAMA0".to_string(),
            },
        ),
        (
            "SERW_64",
            Request::Write {
                handle: 0,
                data: vec![0x55; 64],
            },
        ),
        (
            "SERR",
            Request::Read {
                handle: 0,
                max_len: 8192,
            },
        ),
        ("SERDA", Request::DataAvailable { handle: 0 }),
    ]
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_decode_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_request");
    for (name, request) in fixtures() {
        let bytes = encode_request(&request);
        group.bench_with_input(BenchmarkId::new("cmd", name), &bytes, |b, bytes| {
            b.iter(|| {
                let header = decode_header(black_box(bytes)).unwrap();
                decode_request(header, &bytes[HEADER_SIZE..]).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_encode_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_response");
    group.bench_function("status", |b| {
        let response = Response::status(0);
        b.iter(|| encode_response(black_box(&response)))
    });
    for size in [16usize, 1024, 8192] {
        let response = Response::with_payload(vec![0xAA; size]);
        group.bench_with_input(BenchmarkId::new("read_payload", size), &response, |b, r| {
            b.iter(|| encode_response(black_box(r)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode_request, bench_encode_response);
criterion_main!(benches);
