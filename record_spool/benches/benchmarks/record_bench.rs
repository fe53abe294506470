use std::sync::Arc;

use criterion::{black_box, criterion_group, Criterion};
use record_spool::{
    CsvEncoder, RecordBuffer, RecordDescriptor, RecordEncoder, Recorder, RecorderConfig,
    RecordSink, Value,
};

fn records(c: &mut Criterion) {
    let mut group = c.benchmark_group("Records");

    let descriptor = Arc::new(RecordDescriptor::new("bench", ["scope", "attr", "data"]));
    let scope = [Value::from("outer"), Value::from("inner")];
    let attr = [Value::from("sequence")];
    let data = [Value::from(42_u64)];
    let slots: [&[Value]; 3] = [&scope, &attr, &data];

    group.bench_function("buffered append", |bencher| {
        let mut buffer = RecordBuffer::new(true, 8000, 60000);
        bencher.iter(|| {
            assert!(buffer.try_append(black_box(&descriptor), black_box(&slots)));
            if buffer.len() == 8000 {
                buffer.clear();
            }
        })
    });

    group.bench_function("decode and encode 1024 pending", |bencher| {
        let mut buffer = RecordBuffer::new(true, 2048, 16384);
        for _ in 0..1024 {
            assert!(buffer.try_append(&descriptor, &slots));
        }
        let mut encoder = CsvEncoder::new();
        let mut out: Vec<u8> = Vec::with_capacity(64 * 1024);
        bencher.iter(|| {
            out.clear();
            for record in buffer.records() {
                let record = record.expect("a buffer filled by try_append decodes");
                encoder
                    .encode(&mut out, record.descriptor, &record.slots)
                    .expect("writing to a vec does not fail");
            }
            black_box(out.len())
        })
    });

    group.bench_function("spool to file with overflow", |bencher| {
        let directory = tempfile::tempdir().expect("a temp directory is available");
        let recorder = Recorder::new(&RecorderConfig {
            filename: directory.path().join("bench.csv").display().to_string(),
            record_buffer_size: 8000,
            data_buffer_size: 60000,
            buffer_can_grow: false,
        });
        bencher.iter(|| recorder.write_record(black_box(&descriptor), black_box(&slots)))
    });
}

criterion_group!(benches, records);
