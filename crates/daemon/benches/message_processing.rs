//! Performance benchmarks for message processing.
//!
//! These benchmarks measure the hot paths in the daemon:
//! - Frame decoding and encoding
//! - Keystroke handling in the terminal state machine
//! - Registry lookups under a populated map

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use daemon::executor::CannedExecutor;
use daemon::session::{RegistrySettings, SessionMetadata, SessionRegistry, TerminalSession};
use protocol::{FrameCodec, ServerFrame, TerminalSize};

/// Benchmark frame decoding and encoding.
fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");
    let codec = FrameCodec::new();

    // Single keystroke, the most common frame
    let keystroke = r#"{"type":2,"msg":"a","terminalId":"3f2b8c1e-1111-4a4a-9c9c-000000000000"}"#;
    group.throughput(Throughput::Bytes(keystroke.len() as u64));
    group.bench_function("decode_keystroke", |b| {
        b.iter(|| codec.decode(black_box(keystroke)))
    });

    // Pasted block of text
    let paste = serde_json::json!({ "type": 2, "msg": "x".repeat(4096) }).to_string();
    group.throughput(Throughput::Bytes(paste.len() as u64));
    group.bench_function("decode_paste_4KB", |b| {
        b.iter(|| codec.decode(black_box(&paste)))
    });

    let resize = r#"{"type":1,"cols":120,"rows":40}"#;
    group.throughput(Throughput::Bytes(resize.len() as u64));
    group.bench_function("decode_resize", |b| {
        b.iter(|| codec.decode(black_box(resize)))
    });

    let output = ServerFrame::output("3f2b8c1e-1111-4a4a-9c9c-000000000000", "a");
    group.bench_function("encode_echo", |b| {
        b.iter(|| codec.encode(black_box(&output)))
    });

    let listing = ServerFrame::output(
        "3f2b8c1e-1111-4a4a-9c9c-000000000000",
        "drwxr-xr-x 2 user user 4096 Jan 1 00:00 src\r\n".repeat(64),
    );
    group.bench_function("encode_listing", |b| {
        b.iter(|| codec.encode(black_box(&listing)))
    });

    group.finish();
}

/// Benchmark the terminal input state machine.
fn bench_terminal_input(c: &mut Criterion) {
    let mut group = c.benchmark_group("terminal_input");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let mut session = TerminalSession::new(
        "bench".to_string(),
        TerminalSize::default(),
        "$ ".to_string(),
        Arc::new(CannedExecutor::new()),
    );

    group.bench_function("printable_keystroke", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let out = session.handle_input(black_box("a")).await;
                session.handle_input("\x7f").await;
                out
            })
        })
    });

    group.bench_function("line_with_command", |b| {
        b.iter(|| runtime.block_on(session.handle_input(black_box("echo hello\r"))))
    });

    group.bench_function("escape_sequence", |b| {
        b.iter(|| runtime.block_on(session.handle_input(black_box("\x1b[A"))))
    });

    group.finish();
}

/// Benchmark registry lookups.
fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    let registry = SessionRegistry::new(
        Arc::new(CannedExecutor::new()),
        RegistrySettings {
            max_sessions: 10_000,
            ..Default::default()
        },
    );
    let ids: Vec<_> = (0..1000)
        .map(|_| {
            registry
                .create(TerminalSize::default(), SessionMetadata::default())
                .unwrap()
        })
        .collect();

    group.bench_function("get_1000", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % ids.len();
            registry.get(black_box(&ids[i])).is_ok()
        })
    });

    group.bench_function("touch_1000", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % ids.len();
            registry.touch(black_box(&ids[i]))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_frame_codec, bench_terminal_input, bench_registry);
criterion_main!(benches);
