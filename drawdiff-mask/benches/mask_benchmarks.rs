use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use drawdiff_mask::{DifferenceClassifier, morphology, ssim};
use image::{GrayImage, Luma};

/// Page pair with a removed block, an added block and a rehatched block.
fn create_page_pair(size: u32) -> (GrayImage, GrayImage) {
    let mut reference = GrayImage::from_pixel(size, size, Luma([255u8]));
    let mut target = GrayImage::from_pixel(size, size, Luma([255u8]));
    let q = size / 4;

    for y in q..q + 40 {
        for x in q..q + 40 {
            reference.put_pixel(x, y, Luma([0u8]));
        }
    }
    for y in 2 * q..2 * q + 40 {
        for x in q..q + 40 {
            target.put_pixel(x, y, Luma([0u8]));
        }
    }
    for y in q..q + 40 {
        for x in 2 * q..2 * q + 40 {
            let vertical = if x % 2 == 0 { 100u8 } else { 130 };
            let horizontal = if y % 2 == 0 { 100u8 } else { 130 };
            reference.put_pixel(x, y, Luma([vertical]));
            target.put_pixel(x, y, Luma([horizontal]));
        }
    }
    (reference, target)
}

fn speckled_mask(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |x, y| {
        // Deterministic speckle with a few larger blobs.
        let speck = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) % 17 == 0;
        let blob = (x / 40 + y / 40) % 5 == 0 && x % 40 < 12 && y % 40 < 12;
        Luma([if speck || blob { 255u8 } else { 0 }])
    })
}

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification");
    group.sample_size(10);

    for &size in &[512u32, 1024] {
        let (reference, target) = create_page_pair(size);
        let classifier = DifferenceClassifier::new(30, 0.85).unwrap();

        group.bench_with_input(
            BenchmarkId::new("classify", format!("{size}x{size}")),
            &(&reference, &target),
            |b, (reference, target)| {
                b.iter(|| black_box(classifier.classify(reference, target).unwrap()))
            },
        );
    }

    group.finish();
}

fn bench_ssim(c: &mut Criterion) {
    let mut group = c.benchmark_group("ssim");

    let (reference, target) = create_page_pair(512);
    group.bench_function("map_512x512_window7", |b| {
        b.iter(|| black_box(ssim::ssim_map(black_box(&reference), black_box(&target), 7)))
    });

    group.finish();
}

fn bench_morphology(c: &mut Criterion) {
    let mut group = c.benchmark_group("morphology");

    let mask = speckled_mask(512);
    for kernel in [2u32, 3] {
        group.bench_with_input(
            BenchmarkId::new("cleanup_512x512", kernel),
            &kernel,
            |b, &kernel| b.iter(|| black_box(morphology::cleanup(black_box(&mask), kernel))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_classification, bench_ssim, bench_morphology);
criterion_main!(benches);
