use instaprint::{Config, Printer, QrLevel};
use std::env;
//
// cargo run --example print_qr -- "https://example.com" [L|M|Q|H]
//

fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("usage: print_qr <text> [L|M|Q|H]");
        return;
    }

    let level = match args.get(2).map(|s| s.to_uppercase()).as_deref() {
        None | Some("M") => QrLevel::M,
        Some("L") => QrLevel::L,
        Some("Q") => QrLevel::Q,
        Some("H") => QrLevel::H,
        Some(other) => {
            eprintln!("Unknown level '{}'", other);
            return;
        }
    };

    let vid = u16::from_str_radix(&env::var("PRINTER_VID").unwrap(), 16).unwrap();
    let pid = u16::from_str_radix(&env::var("PRINTER_PID").unwrap(), 16).unwrap();
    let config = Config::new(vid, pid);

    let printer = Printer::open(&config).unwrap();
    match printer.print_qr(level, &args[1]) {
        Ok(()) => println!("printed at level {:?}", level),
        Err(err) => println!("Error {:?}", err),
    }
    printer.feed(80).unwrap();
}
