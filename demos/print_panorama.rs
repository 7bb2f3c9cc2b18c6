use instaprint::{convert, shift_center, Config, Error, Printer};
use std::env;
//
// cargo run --example print_panorama -- assets/panorama.jpg [--shift]
//
// The printer is looked up with PRINTER_VID / PRINTER_PID (hex) and the
// optional PRINTER_SERIAL, read from the environment or a `.env` file.
//

fn hex_var(name: &str) -> u16 {
    let value = env::var(name).unwrap_or_else(|_| panic!("{} is not set", name));
    u16::from_str_radix(value.trim_start_matches("0x"), 16)
        .unwrap_or_else(|_| panic!("{} must be a hex number, got {}", name, value))
}

fn config_from_env() -> Config {
    let config = Config::new(hex_var("PRINTER_VID"), hex_var("PRINTER_PID"));
    match env::var("PRINTER_SERIAL") {
        Ok(serial) => config.serial(serial),
        Err(_) => config,
    }
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("usage: print_panorama <image> [--shift]");
        return;
    }
    let shift = args.iter().skip(2).any(|a| a == "--shift");

    let image = image::open(&args[1]).unwrap().into_rgba8();
    let image = if shift { shift_center(image) } else { image };

    let raster = match convert(image) {
        Ok(raster) => raster,
        Err(err) => {
            eprintln!("Cannot print this image: {}", err);
            return;
        }
    };
    println!("Raster: {} rows", raster.height());

    match Printer::open(&config_from_env()) {
        Ok(printer) => {
            printer.print(&raster).unwrap();
            printer.feed(100).unwrap();
            printer.close().unwrap();
            println!("done");
        }
        Err(Error::PermissionDenied) => {
            eprintln!("No permission to open the printer, check your udev rules");
        }
        Err(err) => panic!("Failed to open printer: {}", err),
    }
}
