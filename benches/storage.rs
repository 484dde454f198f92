use divan::{black_box, Bencher};
use driftq::Store;
use tempfile::TempDir;

fn main() {
    divan::main();
}

fn create_store() -> (Store, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = Store::open(temp_dir.path()).expect("Failed to open store");
    (store, temp_dir)
}

#[divan::bench(sample_size = 1, sample_count = 5)]
fn keyed_produce_1kb(bencher: Bencher) {
    let payload = "x".repeat(1024);
    bencher.bench(|| {
        let (store, _temp_dir) = create_store();
        for i in 0..500 {
            black_box(
                store
                    .produce("bench", &format!("key_{i}"), &payload)
                    .unwrap(),
            );
        }
    });
}

#[divan::bench(sample_size = 1, sample_count = 5)]
fn round_robin_produce_1kb(bencher: Bencher) {
    let payload = "x".repeat(1024);
    bencher.bench(|| {
        let (store, _temp_dir) = create_store();
        store.create_topic("bench", 4).unwrap();
        for _ in 0..500 {
            black_box(store.produce("bench", "", &payload).unwrap());
        }
    });
}

#[divan::bench]
fn fetch_full_batch(bencher: Bencher) {
    let (store, _temp_dir) = create_store();
    store.create_topic("bench", 1).unwrap();
    let payload = "x".repeat(512);
    for _ in 0..1000 {
        store.produce("bench", "hot", &payload).unwrap();
    }

    bencher.bench(|| {
        let batch = store.fetch("bench", 0, 0, 1000).unwrap();
        assert_eq!(black_box(batch).records.len(), 1000);
    });
}
