//! Criterion microbenches for framelink linking and readout.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - Affine approximation fitting between two celestial frames
//! - Full link-set recomputation over a loaded collection
//! - Single-point coordinate readout through the link graph

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use framelink::collection::Dataset;
use framelink::frame::{AffineWcs, CelestialWcs, FrameAdapter, SkyCoord};
use framelink::link::{fit_affine, LinkOptions, LinkType};
use framelink::session::{Session, DEFAULT_VIEWER_ID};

const N_DATASETS: usize = 8;

fn fixture_wcs(crpix: [f64; 2]) -> AffineWcs {
    AffineWcs::new(
        crpix,
        SkyCoord::new(337.5202808, -20.83333306),
        [[-1.0e-4, 0.0], [0.0, 1.0e-4]],
    )
}

fn fixture_session() -> Session {
    let mut session = Session::new();
    for i in 0..N_DATASETS {
        session
            .load_dataset(Dataset::filled(
                format!("image_{i}[SCI,1]"),
                (10, 10),
                1.0,
                "",
                FrameAdapter::Affine(fixture_wcs([i as f64, 0.0])),
            ))
            .expect("load fixture dataset");
    }
    session
}

/// Benchmark the affine approximation fit for one frame pair.
fn bench_affine_fit(c: &mut Criterion) {
    let a = fixture_wcs([0.0, 0.0]);
    let b = fixture_wcs([1.0, 0.0]);

    c.bench_function("fit_affine", |bench| {
        bench.iter(|| {
            let fit = fit_affine(
                CelestialWcs::Affine(black_box(&a)),
                (10, 10),
                CelestialWcs::Affine(black_box(&b)),
            );
            black_box(fit)
        })
    });
}

/// Benchmark a full WCS link recomputation over the collection.
fn bench_link_recompute(c: &mut Criterion) {
    let mut session = fixture_session();
    let options = LinkOptions {
        link_type: LinkType::Wcs,
        error_on_fail: true,
        ..Default::default()
    };

    let mut group = c.benchmark_group("link_recompute");
    group.throughput(Throughput::Elements(N_DATASETS as u64));
    group.bench_function("link_data_wcs", |bench| {
        bench.iter(|| session.link_data(black_box(options)).expect("relink"))
    });
    group.finish();
}

/// Benchmark a single mouse-over readout through the link graph.
fn bench_readout(c: &mut Criterion) {
    let mut session = fixture_session();
    session
        .link_data(LinkOptions {
            link_type: LinkType::Wcs,
            error_on_fail: true,
            ..Default::default()
        })
        .expect("relink");

    c.bench_function("readout", |bench| {
        bench.iter(|| {
            let readout = session
                .readout(DEFAULT_VIEWER_ID, black_box(3.5), black_box(4.5))
                .expect("readout");
            black_box(readout)
        })
    });
}

criterion_group!(
    benches,
    bench_affine_fit,
    bench_link_recompute,
    bench_readout
);
criterion_main!(benches);
