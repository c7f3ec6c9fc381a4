use blobmap::{
    BufferDataLoader, Container, ContainerWriter, DataSegment, NamedDataMap, OwnedNamedData,
    WriterConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn benchmark_owned_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("NamedDataMap");

    for num_keys in [16usize, 256, 4096].iter() {
        let loader = BufferDataLoader::new(vec![0u8; 64 * num_keys]);
        let named: Vec<OwnedNamedData> = (0..*num_keys)
            .map(|i| OwnedNamedData::new(format!("layers.{}.weight", i), i as u32))
            .collect();
        let segments: Vec<DataSegment> = (0..*num_keys)
            .map(|i| DataSegment::new(i as u64 * 64, 64))
            .collect();
        let map = NamedDataMap::create(Some(&loader), 0, Some(&named), Some(&segments)).unwrap();
        let last = format!("layers.{}.weight", num_keys - 1);

        group.bench_with_input(BenchmarkId::new("get_data_last", num_keys), &last, |b, key| {
            b.iter(|| {
                let buffer = map.get_data(black_box(key)).unwrap();
                black_box(buffer.size());
            });
        });

        group.bench_with_input(BenchmarkId::new("get_data_missing", num_keys), num_keys, |b, _| {
            b.iter(|| {
                black_box(map.get_data(black_box("layers.missing")).is_err());
            });
        });
    }

    group.finish();
}

fn benchmark_container_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("Container");

    for num_keys in [16usize, 1024].iter() {
        let mut writer = ContainerWriter::new(WriterConfig::default()).unwrap();
        for i in 0..*num_keys {
            writer
                .add_data(format!("blocks.{}.bias", i), vec![i as u8; 256])
                .unwrap();
        }
        let loader = BufferDataLoader::new(writer.to_bytes().unwrap());

        group.bench_with_input(BenchmarkId::new("open", num_keys), num_keys, |b, _| {
            b.iter(|| {
                let container = Container::load(&loader).unwrap();
                black_box(container.segment_base_offset());
            });
        });

        let container = Container::load(&loader).unwrap();
        let tables = container.tables().unwrap();
        let map = container.named_data_map(&tables).unwrap();
        let middle = format!("blocks.{}.bias", num_keys / 2);

        group.bench_with_input(BenchmarkId::new("get_data_middle", num_keys), &middle, |b, key| {
            b.iter(|| {
                let buffer = map.get_data(black_box(key)).unwrap();
                black_box(buffer.data()[0]);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_owned_lookup, benchmark_container_lookup);
criterion_main!(benches);
