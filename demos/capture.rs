use instaprint::{convert, Printer, QrLevel, StreamTransport};
use std::fs::File;
use std::io::BufWriter;
//
// cargo run --example capture -- assets/panorama.jpg job.bin
//
// Runs the whole pipeline without a printer and stores the exact bytes that
// would go over the wire.
//

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        println!("usage: capture <image> <output>");
        return;
    }

    let image = image::open(&args[1]).unwrap().into_rgba8();
    let raster = convert(image).unwrap();

    let out = BufWriter::new(File::create(&args[2]).unwrap());
    let printer = Printer::with_transport(StreamTransport::new(out));
    printer.print(&raster).unwrap();
    printer.print_qr(QrLevel::M, "instaprint").unwrap();
    printer.feed(100).unwrap();
    printer.close().unwrap();

    println!("{} rows written to {}", raster.height(), args[2]);
}
