use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use instaprint::{
    convert_with, Error, Printer, QrLevel, State, StreamTransport, Threshold, Transport,
    DEFAULT_TIMEOUT, MAX_CHUNK, RASTER_WIDTH_BYTES, TARGET_HEIGHT, TARGET_WIDTH,
};

/// Transport double that records every successful write.
#[derive(Clone, Default)]
struct Recorder {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
    closed: Arc<AtomicBool>,
    /// Index of the write that fails with a timeout.
    fail_at: Option<usize>,
    delay: Option<Duration>,
}

impl Recorder {
    fn failing_at(index: usize) -> Self {
        Recorder {
            fail_at: Some(index),
            ..Recorder::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Recorder {
            delay: Some(delay),
            ..Recorder::default()
        }
    }

    fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    fn attempts(&self) -> usize {
        self.timeouts.lock().unwrap().len()
    }
}

impl Transport for Recorder {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> instaprint::Result<()> {
        let attempt = {
            let mut timeouts = self.timeouts.lock().unwrap();
            timeouts.push(timeout);
            timeouts.len() - 1
        };
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.fail_at == Some(attempt) {
            return Err(Error::Timeout);
        }
        self.writes.lock().unwrap().push(buf.to_vec());
        Ok(())
    }

    fn close(&mut self) -> instaprint::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn open(recorder: &Recorder) -> Printer<Recorder> {
    Printer::with_transport(recorder.clone())
}

#[test]
fn raster_header_then_body() {
    let rec = Recorder::default();
    let printer = open(&rec);
    let data = vec![0x5A; 96];

    printer.print_raster(&data).unwrap();

    assert_eq!(rec.writes(), vec![vec![0x1C, 0x2A, 0x65, 0x00, 0x02], data]);
}

#[test]
fn large_raster_is_written_in_chunks() {
    let rec = Recorder::default();
    let printer = open(&rec);
    let data: Vec<u8> = (0..3 * MAX_CHUNK + 48).map(|i| (i / 7) as u8).collect();

    printer.print_raster(&data).unwrap();

    let writes = rec.writes();
    let height = (data.len() / RASTER_WIDTH_BYTES) as u16;
    assert_eq!(writes[0], vec![0x1C, 0x2A, 0x65, (height >> 8) as u8, height as u8]);
    assert_eq!(writes.len(), 5);
    assert!(writes[1..].iter().all(|w| w.len() <= MAX_CHUNK));
    assert_eq!(writes[1..].concat(), data);
}

#[test]
fn malformed_raster_writes_nothing() {
    let rec = Recorder::default();
    let printer = open(&rec);

    let err = printer.print_raster(&[0; 100]).unwrap_err();

    assert!(matches!(err, Error::MalformedRaster(100)));
    assert_eq!(rec.attempts(), 0);
}

#[test]
fn too_tall_raster_writes_nothing() {
    let rec = Recorder::default();
    let printer = open(&rec);

    let err = printer
        .print_raster(&vec![0; RASTER_WIDTH_BYTES * 0x10000])
        .unwrap_err();

    assert!(matches!(err, Error::RasterTooTall(0x10000)));
    assert_eq!(rec.attempts(), 0);
}

#[test]
fn qr_code_is_framed_by_feeds() {
    let rec = Recorder::default();
    let printer = open(&rec);

    printer.print_qr(QrLevel::L, "hello").unwrap();

    assert_eq!(
        rec.writes(),
        vec![
            vec![0x1B, 0x4A, 20],
            vec![0x1D, 0x78, 0x4C, 0x05],
            b"hello".to_vec(),
            vec![0x1B, 0x4A, 20],
        ]
    );
}

#[test]
fn qr_payload_too_long_writes_nothing() {
    let rec = Recorder::default();
    let printer = open(&rec);

    let err = printer.print_qr(QrLevel::H, &"x".repeat(65)).unwrap_err();

    assert!(matches!(err, Error::PayloadTooLong { len: 65, max: 64 }));
    assert_eq!(rec.attempts(), 0);
}

#[test]
fn qr_header_failure_skips_trailing_feed() {
    let rec = Recorder::failing_at(1);
    let printer = open(&rec);

    let err = printer.print_qr(QrLevel::M, "hello").unwrap_err();

    assert!(matches!(err, Error::Timeout));
    assert_eq!(rec.attempts(), 2);
    assert_eq!(rec.writes(), vec![vec![0x1B, 0x4A, 20]]);
}

#[test]
fn qr_payload_failure_skips_trailing_feed() {
    let rec = Recorder::failing_at(2);
    let printer = open(&rec);

    let err = printer.print_qr(QrLevel::M, "hello").unwrap_err();

    assert!(matches!(err, Error::Timeout));
    assert_eq!(rec.attempts(), 3);
    assert_eq!(
        rec.writes(),
        vec![vec![0x1B, 0x4A, 20], vec![0x1D, 0x78, 0x4D, 0x05]]
    );
}

#[test]
fn raster_chunk_failure_stops_sequence() {
    let rec = Recorder::failing_at(2);
    let printer = open(&rec);

    let err = printer.print_raster(&vec![0; 2 * MAX_CHUNK + 96]).unwrap_err();

    assert!(matches!(err, Error::Timeout));
    assert_eq!(rec.attempts(), 3);
    assert_eq!(rec.writes().len(), 2);
}

#[test]
fn feed_limits() {
    let rec = Recorder::default();
    let printer = open(&rec);

    printer.feed(0).unwrap();
    printer.feed(255).unwrap();
    assert!(matches!(printer.feed(256), Err(Error::OutOfRange(256))));
    assert!(matches!(printer.feed(-1), Err(Error::OutOfRange(-1))));

    assert_eq!(
        rec.writes(),
        vec![vec![0x1B, 0x4A, 0x00], vec![0x1B, 0x4A, 0xFF]]
    );
}

#[test]
fn every_write_uses_the_timeout() {
    let rec = Recorder::default();
    let printer = open(&rec);
    printer.print_qr(QrLevel::Q, "abc").unwrap();
    assert!(rec
        .timeouts
        .lock()
        .unwrap()
        .iter()
        .all(|&t| t == DEFAULT_TIMEOUT));
    assert_eq!(DEFAULT_TIMEOUT, Duration::from_millis(10_000));

    let rec = Recorder::default();
    let printer = Printer::with_transport(rec.clone()).timeout(Duration::from_millis(250));
    printer.feed(1).unwrap();
    assert_eq!(*rec.timeouts.lock().unwrap(), vec![Duration::from_millis(250)]);
}

#[test]
fn unopened_printer_is_not_connected() {
    let printer: Printer<Recorder> = Printer::new();
    assert_eq!(printer.state(), State::Unopened);

    assert!(matches!(printer.feed(10), Err(Error::NotConnected)));
    assert!(matches!(printer.print_raster(&[0; 48]), Err(Error::NotConnected)));
    assert!(matches!(
        printer.print_qr(QrLevel::L, "x"),
        Err(Error::NotConnected)
    ));

    let rec = Recorder::default();
    printer.connect(rec.clone()).unwrap();
    assert_eq!(printer.state(), State::Open);
    printer.feed(10).unwrap();
    assert_eq!(rec.writes().len(), 1);

    assert!(matches!(
        printer.connect(Recorder::default()),
        Err(Error::AlreadyConnected)
    ));
}

#[test]
fn closed_printer_is_terminal() {
    let rec = Recorder::default();
    let printer = open(&rec);

    printer.close().unwrap();
    assert!(rec.closed.load(Ordering::SeqCst));
    assert_eq!(printer.state(), State::Closed);

    assert!(matches!(printer.feed(10), Err(Error::NotConnected)));
    assert!(matches!(printer.print_raster(&[0; 48]), Err(Error::NotConnected)));
    assert!(matches!(
        printer.print_qr(QrLevel::L, "x"),
        Err(Error::NotConnected)
    ));
    assert_eq!(rec.attempts(), 0);

    printer.close().unwrap();
    assert!(matches!(
        printer.connect(Recorder::default()),
        Err(Error::ConnectionClosed)
    ));
}

#[test]
fn not_connected_is_reported_before_validation() {
    let printer: Printer<Recorder> = Printer::new();

    assert!(matches!(
        printer.print_raster(&[0; 47]),
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        printer.print_qr(QrLevel::H, &"x".repeat(65)),
        Err(Error::NotConnected)
    ));
    assert!(matches!(printer.feed(256), Err(Error::OutOfRange(256))));

    let rec = Recorder::default();
    let printer = open(&rec);
    printer.close().unwrap();

    assert!(matches!(
        printer.print_raster(&[0; 47]),
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        printer.print_qr(QrLevel::H, &"x".repeat(65)),
        Err(Error::NotConnected)
    ));
    assert!(matches!(printer.feed(-1), Err(Error::OutOfRange(-1))));
    assert_eq!(rec.attempts(), 0);
}

#[test]
fn drop_closes_transport() {
    let rec = Recorder::default();
    drop(open(&rec));
    assert!(rec.closed.load(Ordering::SeqCst));
}

#[test]
fn concurrent_commands_do_not_interleave() {
    let rec = Recorder::slow(Duration::from_millis(1));
    let printer = Arc::new(open(&rec));

    let handles: Vec<_> = (1..=4u8)
        .map(|fill| {
            let printer = Arc::clone(&printer);
            thread::spawn(move || {
                let data = vec![fill; 2 * MAX_CHUNK + 96];
                printer.print_raster(&data).unwrap();
                printer.print_qr(QrLevel::L, "qr").unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let writes = rec.writes();
    assert_eq!(writes.len(), 4 * (4 + 4));

    let mut i = 0;
    while i < writes.len() {
        match writes[i][0] {
            0x1C => {
                // Header followed by three chunks of a single fill value.
                let fill = writes[i + 1][0];
                for chunk in &writes[i + 1..i + 4] {
                    assert!(chunk.iter().all(|&b| b == fill));
                }
                i += 4;
            }
            0x1B => {
                assert_eq!(writes[i + 1][..2], [0x1D, 0x78]);
                assert_eq!(writes[i + 2], b"qr".to_vec());
                assert_eq!(writes[i + 3], vec![0x1B, 0x4A, 20]);
                i += 4;
            }
            other => panic!("unexpected frame start {:#x} at {}", other, i),
        }
    }
}

#[test]
fn close_waits_for_running_command() {
    let rec = Recorder::slow(Duration::from_millis(20));
    let printer = Arc::new(open(&rec));

    let worker = {
        let printer = Arc::clone(&printer);
        thread::spawn(move || printer.print_raster(&vec![0; 3 * MAX_CHUNK]))
    };

    while rec.attempts() == 0 {
        thread::yield_now();
    }
    printer.close().unwrap();

    assert_eq!(rec.writes().len(), 4);
    assert!(rec.closed.load(Ordering::SeqCst));
    worker.join().unwrap().unwrap();
}

/// Writer sharing its buffer with the test after the printer is gone.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn panorama_end_to_end() {
    let src = RgbaImage::from_fn(TARGET_WIDTH * 2, TARGET_HEIGHT * 4, |x, y| {
        if (x / 64 + y / 64) % 2 == 0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let raster = convert_with(src, &Threshold(127)).unwrap();
    assert_eq!(raster.height() as u32, TARGET_WIDTH);

    let buf = SharedBuf::default();
    let printer = Printer::with_transport(StreamTransport::new(buf.clone()));
    printer.print(&raster).unwrap();
    printer.feed(100).unwrap();
    printer.close().unwrap();

    let bytes = buf.0.lock().unwrap().clone();
    assert_eq!(bytes.len(), 5 + 73_728 + 3);
    assert_eq!(bytes[..5], [0x1C, 0x2A, 0x65, 0x06, 0x00]);
    assert_eq!(&bytes[5..5 + 73_728], raster.as_bytes());
    assert_eq!(bytes[5 + 73_728..], [0x1B, 0x4A, 100]);
}
