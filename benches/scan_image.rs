use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_barcode::models::ECLevel;
use rust_barcode::qr::{encode, render};
use rust_barcode::{Image, ImageScanner};

fn qr_image(text: &str, scale: usize) -> Image {
    let modules = encode(text.as_bytes(), ECLevel::M).expect("encodable text");
    let (pixels, width, height) = render(&modules, scale, 4);
    Image::new(pixels, width, height).expect("rendered size")
}

fn bench_scan_qr(c: &mut Criterion) {
    let image = qr_image("https://example.com/benchmark", 4);
    c.bench_function("scan_image_qr_v3", |b| {
        let mut scanner = ImageScanner::new();
        b.iter(|| scanner.scan_image(black_box(&image)))
    });
}

fn bench_scan_blank_vga(c: &mut Criterion) {
    let image = Image::new(vec![200u8; 640 * 480], 640, 480).expect("buffer size");
    c.bench_function("scan_image_blank_640x480", |b| {
        let mut scanner = ImageScanner::new();
        b.iter(|| scanner.scan_image(black_box(&image)))
    });
}

fn bench_scan_qr_density_2(c: &mut Criterion) {
    let image = qr_image("density two", 6);
    c.bench_function("scan_image_qr_density_2", |b| {
        let mut scanner = ImageScanner::new();
        scanner.parse_config("*.x-density=2").expect("valid setting");
        scanner.parse_config("*.y-density=2").expect("valid setting");
        b.iter(|| scanner.scan_image(black_box(&image)))
    });
}

criterion_group!(benches, bench_scan_qr, bench_scan_blank_vga, bench_scan_qr_density_2);
criterion_main!(benches);
