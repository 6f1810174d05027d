use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serlink_channel::ByteChannel;
use serlink_sync::Timeout;

fn channel_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("byte_channel");
    let chunk = [0xA5u8; 64];
    let mut out = [0u8; 64];

    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("send_recv_64", |b| {
        let ch = ByteChannel::<1024>::new(1).unwrap();
        b.iter(|| {
            let sent = ch.try_send(black_box(&chunk));
            let got = ch.recv(&mut out, Timeout::Poll).unwrap();
            black_box((sent, got))
        });
    });

    group.throughput(Throughput::Bytes(1));
    group.bench_function("send_recv_1", |b| {
        let ch = ByteChannel::<1024>::new(1).unwrap();
        b.iter(|| {
            ch.try_send(black_box(b"x"));
            black_box(ch.recv_byte(Timeout::Poll).unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, channel_throughput);
criterion_main!(benches);
