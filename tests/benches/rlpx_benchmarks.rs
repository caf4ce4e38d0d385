//! # RLPx Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | ECIES | Seal + open of a handshake-sized envelope |
//! | Handshake | Full auth / auth-ack exchange over an in-memory pipe |
//! | Frame codec | Encode + authenticate + decode per payload size |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rlpx_core::domain::{FrameCodec, MacAccumulator, Nonce, Secrets, FRAME_HEADER_SIZE};
use rlpx_core::test_utils::encrypted_pair;
use rlpx_core::{NodeId, RlpxConfig};
use shared_crypto::Secp256k1KeyPair;
use std::time::Duration;

// ============================================================================
// ECIES
// ============================================================================

fn bench_ecies(c: &mut Criterion) {
    let mut group = c.benchmark_group("ecies");
    let recipient = Secp256k1KeyPair::generate();
    let public = recipient.public_key();
    let plaintext = vec![0xABu8; 300];
    let mac_data = [0x01u8, 0xBD];

    group.bench_function("encrypt", |b| {
        b.iter(|| shared_crypto::encrypt(&public, black_box(&plaintext), &mac_data))
    });

    let envelope = shared_crypto::encrypt(&public, &plaintext, &mac_data).unwrap();
    group.bench_function("decrypt", |b| {
        b.iter(|| shared_crypto::decrypt(&recipient, black_box(&envelope), &mac_data))
    });
    group.finish();
}

// ============================================================================
// HANDSHAKE
// ============================================================================

fn bench_handshake(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("handshake");
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("encryption_handshake_pair", |b| {
        b.iter(|| {
            runtime
                .block_on(encrypted_pair(RlpxConfig::for_testing()))
                .unwrap()
        })
    });
    group.finish();
}

// ============================================================================
// FRAME CODEC
// ============================================================================

fn paired_codecs() -> (FrameCodec, FrameCodec) {
    let aes_key = [0x0Au8; 32];
    let mac_key = [0x0Bu8; 32];
    let mac_a = MacAccumulator::new(&mac_key, &Nonce::from_bytes([2u8; 32]), b"auth");
    let mac_b = MacAccumulator::new(&mac_key, &Nonce::from_bytes([1u8; 32]), b"ack");

    let initiator = Secrets::new(NodeId::new([0xBB; 64]), aes_key, mac_key, mac_a.clone(), mac_b.clone());
    let responder = Secrets::new(NodeId::new([0xAA; 64]), aes_key, mac_key, mac_b, mac_a);
    (
        FrameCodec::new(initiator, usize::MAX),
        FrameCodec::new(responder, usize::MAX),
    )
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");

    for size in [64usize, 1024, 64 * 1024, 1024 * 1024] {
        let payload = vec![0x5Au8; size];
        let (mut sender, mut receiver) = paired_codecs();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("roundtrip", size), &payload, |b, payload| {
            b.iter(|| {
                let frame = sender.encode_frame(0x10, payload).unwrap();
                let mut header = [0u8; FRAME_HEADER_SIZE];
                header.copy_from_slice(&frame[..FRAME_HEADER_SIZE]);
                receiver.decode_header(&header).unwrap();
                black_box(receiver.decode_body(&frame[FRAME_HEADER_SIZE..]).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ecies, bench_handshake, bench_frame_codec);
criterion_main!(benches);
