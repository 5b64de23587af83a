use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mzspecsim::prelude::*;
use mzspecsim::Comparator;

fn synthetic_peaks(seed: u64, n: usize) -> Vec<(f64, f32)> {
    let mut state = seed;
    (0..n)
        .map(|i| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let jitter = (state >> 33) as f64 / (1u64 << 31) as f64;
            let intensity = ((state >> 40) % 1000) as f32 + 1.0;
            (150.0 + i as f64 * 12.5 + jitter, intensity)
        })
        .collect()
}

fn library(size: u64) -> SpectralLibrary {
    let mut library = SpectralLibrary::new();
    for i in 0..size {
        let precursor = 400.0 + (i % 2000) as f64 * 0.25;
        let candidate = Candidate::new(i, precursor, mzspecsim::peaks::peaks_from_pairs(&synthetic_peaks(i, 80)));
        library.push(0, candidate).unwrap();
    }
    library
}

fn queries(count: u64) -> Vec<QuerySpectrum> {
    (0..count)
        .map(|i| {
            let precursor = 400.0 + (i * 7 % 2000) as f64 * 0.25 + 0.1;
            QuerySpectrum::from_pairs(i, "query", precursor, &synthetic_peaks(i * 31 + 5, 120))
        })
        .collect()
}

fn comparators(c: &mut Criterion) {
    let query = mzspecsim::peaks::peaks_from_pairs(&synthetic_peaks(1, 50));
    let candidate = mzspecsim::peaks::peaks_from_pairs(&synthetic_peaks(2, 80));
    for kind in ComparatorKind::ALL {
        for vectorization in VectorizationKind::ALL {
            let settings = SpecSimSettings::default()
                .with_comparator(*kind)
                .with_vectorization(*vectorization)
                .with_xcorr_offset(2);
            let mut comparator = Comparator::from_settings(&settings).unwrap();
            c.bench_function(&format!("compare_{kind}_{vectorization}"), |b| {
                let mut session = comparator.session(&query);
                b.iter(|| session.compare_to(black_box(&candidate)))
            });
        }
    }
}

fn search(c: &mut Criterion) {
    let queries = queries(200);
    let mut library = library(5000);
    let search = SimilaritySearch::new(SpecSimSettings::default().with_tol_mz(1.0)).unwrap();
    c.bench_function("search_200_queries", |b| {
        b.iter(|| search.run(black_box(&queries), &mut library).unwrap())
    });
}

criterion_group!(benches, comparators, search);
criterion_main!(benches);
