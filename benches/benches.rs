use criterion::{criterion_group, criterion_main};


criterion_group!(benches, auction::calls, crypto::sigs);
criterion_main!(benches);
