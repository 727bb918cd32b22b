use criterion::{black_box, criterion_group, criterion_main, Criterion};
use livecode_collab::activity::{ActivityKind, ActivityLog};
use livecode_collab::protocol::{ClientMessage, ServerMessage};
use livecode_collab::state::{BufferState, SessionState};

fn sample_code(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("def handler_{i}(request):\n    return request.body\n"))
        .collect()
}

fn bench_code_update_encode(c: &mut Criterion) {
    let msg = ClientMessage::code_update(sample_code(100), "user_abcdefghi", "python");

    c.bench_function("code_update_encode_100_lines", |b| {
        b.iter(|| {
            black_box(black_box(&msg).encode().unwrap());
        })
    });
}

fn bench_code_update_decode(c: &mut Criterion) {
    let frame = serde_json::json!({
        "type": "code_update",
        "code": sample_code(100),
        "userId": "user_abcdefghi",
    })
    .to_string();

    c.bench_function("code_update_decode_100_lines", |b| {
        b.iter(|| {
            black_box(ServerMessage::decode(black_box(&frame)).unwrap());
        })
    });
}

fn bench_small_frame_decode(c: &mut Criterion) {
    let frame = r#"{"type":"user_joined","connectionCount":12}"#;

    c.bench_function("user_joined_decode", |b| {
        b.iter(|| {
            black_box(ServerMessage::decode(black_box(frame)).unwrap());
        })
    });
}

fn bench_unknown_frame_decode(c: &mut Criterion) {
    let frame = r#"{"type":"typing","userId":"user_abcdefghi","extra":[1,2,3]}"#;

    c.bench_function("unknown_kind_decode", |b| {
        b.iter(|| {
            black_box(ServerMessage::decode(black_box(frame)).unwrap());
        })
    });
}

fn bench_activity_append_full(c: &mut Criterion) {
    let mut log = ActivityLog::new(100);
    for i in 0..100 {
        log.append(ActivityKind::System, format!("warmup {i}"));
    }

    c.bench_function("activity_append_evicting", |b| {
        b.iter(|| {
            log.append(ActivityKind::Update, black_box("Code updated by user_abcdefghi"));
        })
    });
}

fn bench_activity_view(c: &mut Criterion) {
    let mut log = ActivityLog::new(100);
    for i in 0..100 {
        log.append(ActivityKind::Join, format!("User joined ({i} total)"));
    }

    c.bench_function("activity_recent_20", |b| {
        b.iter(|| {
            black_box(log.recent(black_box(20)));
        })
    });
}

fn bench_reconcile_stream(c: &mut Criterion) {
    let frames: Vec<String> = (0..1000)
        .map(|i| match i % 4 {
            0 => format!(r#"{{"type":"code_update","code":"x = {i}","userId":"user_{i}"}}"#),
            1 => format!(r#"{{"type":"user_joined","connectionCount":{i}}}"#),
            2 => format!(r#"{{"type":"cursor_move","cursorPosition":{i},"userId":"user_{i}"}}"#),
            _ => format!(r#"{{"type":"user_left","connectionCount":{i}}}"#),
        })
        .collect();

    c.bench_function("reconcile_1k_frames", |b| {
        b.iter(|| {
            let mut state = SessionState::new(BufferState::new("", "python"), 100);
            for frame in &frames {
                if let Ok(msg) = ServerMessage::decode(frame) {
                    state.apply(msg);
                }
            }
            black_box(state.participants());
        })
    });
}

criterion_group!(
    benches,
    bench_code_update_encode,
    bench_code_update_decode,
    bench_small_frame_decode,
    bench_unknown_frame_decode,
    bench_activity_append_full,
    bench_activity_view,
    bench_reconcile_stream,
);
criterion_main!(benches);
