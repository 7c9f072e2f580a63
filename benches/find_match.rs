use argos_magic::builtin::PNG_SIGNATURE;
use argos_magic::{MagicEntries, MagicEntry};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn samples() -> Vec<(&'static str, Vec<u8>)> {
    let mut png = PNG_SIGNATURE.to_vec();
    png.extend_from_slice(&[0, 0, 0, 13]);
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&1920u32.to_be_bytes());
    png.extend_from_slice(&1080u32.to_be_bytes());

    let mut id3 = b"ID3\x04\x00\x00\x00\x00\x01\x00".to_vec();
    id3.resize(10 + 128, 0);
    id3.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);

    vec![
        ("pdf", b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec()),
        ("png", png),
        ("elf", b"\x7FELF\x02\x01\x01\x00\x00\x00\x00\x00".to_vec()),
        ("id3", id3),
        ("unknown", vec![0x42; 4096]),
    ]
}

fn bench_find_match(c: &mut Criterion) {
    let entries = MagicEntries::default_images().expect("built-in rules");
    let mut group = c.benchmark_group("find_match");

    for (name, data) in samples() {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| entries.find_match(black_box(data)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let entries = MagicEntries::default_images().expect("built-in rules");
    let rules: Vec<MagicEntry> = entries.entries().cloned().collect();
    let encoded = MagicEntry::write_all(&rules);

    c.bench_function("decode_builtin_rules", |b| {
        b.iter(|| MagicEntry::read_all(black_box(encoded.clone())))
    });
    c.bench_function("build_builtin_rules", |b| {
        b.iter(|| MagicEntries::build(black_box(rules.clone())))
    });
}

criterion_group!(benches, bench_find_match, bench_decode);
criterion_main!(benches);
