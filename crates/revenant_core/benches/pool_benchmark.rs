//! # Pool Churn Benchmark
//!
//! Steady-state lease/release churn should be served from free lists with
//! no host materialization after warm-up.
//!
//! Run with: `cargo bench --package revenant_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use revenant_core::host::memory::{MemoryHost, MemoryPrototypes};
use revenant_core::{LocalCreate, PoolState, PoolingConfig, Prototype, TokenAllocator};
use revenant_shared::{Category, OwnerId, Placement, TokenId};

fn orb() -> LocalCreate {
    LocalCreate::new("Projectiles/Orb", Placement::NEUTRAL, Category::Local)
}

/// Benchmark: token allocation against a sparse live set.
fn bench_token_allocation(c: &mut Criterion) {
    c.bench_function("token_allocation", |b| {
        let mut tokens = TokenAllocator::new(10_000);
        b.iter(|| black_box(tokens.allocate(OwnerId(7), |t: TokenId| t.0 % 3 == 0)));
    });
}

/// Benchmark: lease and release N entities per iteration.
fn bench_lease_release_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("lease_release_churn");

    for count in [16usize, 256, 1_024] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let prototypes = MemoryPrototypes::new().with(Prototype::new("Projectiles/Orb"));
            let mut host = MemoryHost::new();
            let config = PoolingConfig {
                default_max_pool_size: count,
                ..PoolingConfig::default()
            };
            let Ok(mut state) = PoolState::new(config, OwnerId(1)) else {
                return;
            };
            let mut leased = Vec::with_capacity(count);

            b.iter(|| {
                for _ in 0..count {
                    if let Ok((entity, _)) = state.create_local(&prototypes, &mut host, orb()) {
                        leased.push(entity);
                    }
                }
                for entity in leased.drain(..) {
                    black_box(state.release(&mut host, entity).is_ok());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_token_allocation, bench_lease_release_churn);
criterion_main!(benches);
