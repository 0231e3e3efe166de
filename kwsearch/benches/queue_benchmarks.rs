use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kwsearch::{
    queue::RingBuffer, request::MAX_RECORD_LEN, EncodingMode, Handler, OutputSink, Request,
    SerializedWriter,
};
use std::{fs::File, io::Write, num::NonZeroUsize, sync::Arc};
use tempfile::tempdir;

fn create_test_files(
    dir: &tempfile::TempDir,
    file_count: usize,
    lines_per_file: usize,
) -> std::io::Result<()> {
    for i in 0..file_count {
        let file_path = dir.path().join(format!("test_{}.txt", i));
        let mut file = File::create(file_path)?;
        for j in 0..lines_per_file {
            writeln!(
                file,
                "Line {} status ok request {} latency {} needle trailing words",
                j, j, j
            )?;
        }
    }
    Ok(())
}

fn bench_ring_round_trip(c: &mut Criterion) {
    let records = [
        "/srv/logs timeout".to_string(),
        format!("/{} needle", "deep/".repeat(60)),
    ];

    let mut group = c.benchmark_group("Ring Buffer");
    for slots in [2usize, 16] {
        let capacity = slots * MAX_RECORD_LEN;
        let region = vec![0u8; RingBuffer::<Vec<u8>>::region_len(capacity)];
        let mut ring = RingBuffer::new(region).unwrap();

        group.bench_with_input(BenchmarkId::new("round_trip", slots), &slots, |b, _| {
            b.iter(|| {
                for record in &records {
                    ring.write(record.as_bytes()).unwrap();
                }
                for _ in &records {
                    black_box(ring.read().unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_handler_fan_out(c: &mut Criterion) {
    let out = tempdir().unwrap();
    let sink: Arc<dyn SerializedWriter> =
        Arc::new(OutputSink::open(out.path().join("output.txt")).unwrap());

    let mut group = c.benchmark_group("Handler");
    group.sample_size(20);
    for file_count in [1usize, 8, 32] {
        let dir = tempdir().unwrap();
        create_test_files(&dir, file_count, 500).unwrap();
        let request = Request::new(dir.path(), "needle");

        for buffer in [1usize, 64] {
            let handler = Handler::new(
                NonZeroUsize::new(buffer).unwrap(),
                EncodingMode::Lossy,
                Arc::clone(&sink),
            );
            group.bench_function(format!("files_{}_buffer_{}", file_count, buffer), |b| {
                b.iter(|| black_box(handler.handle(&request).unwrap()));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_ring_round_trip, bench_handler_fan_out);
criterion_main!(benches);
