use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spool_io::BufferingReadStream;
use std::io::{Read, Seek, SeekFrom};

const BODY_LEN: usize = 256 * 1024;

fn make_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn drain<R: Read>(reader: &mut R, buf: &mut [u8]) -> usize {
    let mut total = 0;
    loop {
        let n = reader.read(buf).unwrap();
        if n == 0 {
            return total;
        }
        total += n;
    }
}

fn bench_first_pass(c: &mut Criterion) {
    let body = make_body(BODY_LEN);
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("first_pass");
    group.throughput(Throughput::Bytes(BODY_LEN as u64));

    // Memory tier: threshold above the body. Disk tier: spills after 30 KiB.
    for (tier, threshold) in [("memory", 1024 * 1024), ("disk", 30 * 1024)] {
        group.bench_with_input(BenchmarkId::new(tier, BODY_LEN), &threshold, |b, &threshold| {
            let mut buf = vec![0u8; 8 * 1024];
            b.iter(|| {
                let mut stream = BufferingReadStream::builder(&body[..])
                    .memory_threshold(threshold)
                    .temp_dir(dir.path())
                    .build()
                    .unwrap();
                drain(&mut stream, &mut buf)
            })
        });
    }
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let body = make_body(BODY_LEN);
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("replay");
    group.throughput(Throughput::Bytes(BODY_LEN as u64));

    for (tier, threshold) in [("memory", 1024 * 1024), ("disk", 30 * 1024)] {
        let mut stream = BufferingReadStream::builder(&body[..])
            .memory_threshold(threshold)
            .temp_dir(dir.path())
            .build()
            .unwrap();
        stream.buffer_to_end().unwrap();
        let mut buf = vec![0u8; 8 * 1024];
        group.bench_function(BenchmarkId::new(tier, BODY_LEN), |b| {
            b.iter(|| {
                stream.seek(SeekFrom::Start(0)).unwrap();
                drain(&mut stream, &mut buf)
            })
        });
    }
    group.finish();
}

criterion_group!(streams, bench_first_pass, bench_replay);
criterion_main!(streams);
