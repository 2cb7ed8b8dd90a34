use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_barcode::{Decoder, Scanner};

/// A 640 sample line of alternating bars with varying widths.
fn synthetic_line(len: usize) -> Vec<i32> {
    let widths = [2usize, 4, 2, 6, 2, 2, 4, 8];
    let mut line = Vec::with_capacity(len);
    let mut dark = false;
    for &w in widths.iter().cycle() {
        if line.len() >= len {
            break;
        }
        line.extend(std::iter::repeat_n(if dark { 20 } else { 230 }, w));
        dark = !dark;
    }
    line.truncate(len);
    line
}

fn bench_detached_scanner(c: &mut Criterion) {
    let line = synthetic_line(640);
    c.bench_function("edge_scanner_detached_640", |b| {
        let mut scanner = Scanner::detached();
        b.iter(|| {
            for &y in &line {
                black_box(scanner.scan_y(black_box(y)));
            }
            scanner.quiet_border()
        })
    });
}

fn bench_scanner_with_decoder(c: &mut Criterion) {
    let line = synthetic_line(640);
    c.bench_function("edge_scanner_decoder_640", |b| {
        let mut scanner = Scanner::new(Decoder::new());
        b.iter(|| {
            for &y in &line {
                black_box(scanner.scan_y(black_box(y)));
            }
            scanner.quiet_border()
        })
    });
}

criterion_group!(benches, bench_detached_scanner, bench_scanner_with_decoder);
criterion_main!(benches);
