//! Throwaway HTTP/1.1 file server for the integration tests (HEAD plus ranged GET).
//!
//! Serves a single static body. HEAD answers with Content-Length and (optionally)
//! Accept-Ranges; GET with Range answers 206. Knobs simulate servers that block HEAD,
//! ignore Range, or refuse ranged requests; counters record what was asked for.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405.
    pub head_allowed: bool,
    /// If false, GET answers 200 with the whole body even when a Range was sent.
    pub support_ranges: bool,
    /// Whether HEAD/GET advertise `Accept-Ranges: bytes`.
    pub advertise_ranges: bool,
    /// Status returned instead of 206 for any GET carrying a Range header.
    pub ranged_status: Option<u16>,
    /// Status returned for every GET.
    pub get_status: Option<u16>,
    /// Send the body in pieces of this size, sleeping between them.
    pub throttle: Option<(usize, Duration)>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            ranged_status: None,
            get_status: None,
            throttle: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    pub heads: AtomicUsize,
    pub ranged_gets: AtomicUsize,
    pub plain_gets: AtomicUsize,
}

impl Stats {
    pub fn total(&self) -> usize {
        self.heads.load(Ordering::SeqCst) + self.ranged_gets.load(Ordering::SeqCst) + self.plain_gets.load(Ordering::SeqCst)
    }

    pub fn plain_gets(&self) -> usize {
        self.plain_gets.load(Ordering::SeqCst)
    }

    pub fn ranged_gets(&self) -> usize {
        self.ranged_gets.load(Ordering::SeqCst)
    }
}

pub struct RangeServer {
    /// Base URL of the served file, e.g. "http://127.0.0.1:12345/file.bin".
    pub url: String,
    pub stats: Arc<Stats>,
}

/// Starts a server in a background thread serving `body`. Runs until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
    let addr = listener.local_addr().expect("test server address");
    let body: Arc<[u8]> = body.into();
    let stats = Arc::new(Stats::default());
    let counters = Arc::clone(&stats);
    thread::spawn(move || {
        for conn in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let counters = Arc::clone(&counters);
            thread::spawn(move || handle(conn, &body, opts, &counters));
        }
    });
    RangeServer {
        url: format!("http://{}/file.bin", addr),
        stats,
    }
}

fn status_line(code: u16) -> String {
    let reason = match code {
        200 => "OK",
        206 => "Partial Content",
        403 => "Forbidden",
        405 => "Method Not Allowed",
        416 => "Range Not Satisfiable",
        429 => "Too Many Requests",
        _ => "Error",
    };
    format!("HTTP/1.1 {} {}", code, reason)
}

fn write_error(stream: &mut TcpStream, code: u16) {
    let body = b"refused";
    let head = format!("{}\r\nContent-Length: {}\r\n\r\n", status_line(code), body.len());
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn handle(mut stream: TcpStream, body: &[u8], opts: RangeServerOptions, stats: &Stats) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_head(&stream) else {
        return;
    };
    let (method, range) = (req.method.as_str(), req.range);
    let total = body.len() as u64;
    let accept_ranges = if opts.advertise_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };

    if method.eq_ignore_ascii_case("HEAD") {
        stats.heads.fetch_add(1, Ordering::SeqCst);
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
            return;
        }
        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n", total, accept_ranges);
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        write_error(&mut stream, 405);
        return;
    }

    match range {
        Some(_) => stats.ranged_gets.fetch_add(1, Ordering::SeqCst),
        None => stats.plain_gets.fetch_add(1, Ordering::SeqCst),
    };
    if let Some(code) = opts.get_status {
        write_error(&mut stream, code);
        return;
    }
    if let (Some(code), Some(_)) = (opts.ranged_status, range) {
        write_error(&mut stream, code);
        return;
    }

    let (status, content_range, slice) = match range.filter(|_| opts.support_ranges) {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl || start >= total {
                (416, format!("bytes */{}", total), &body[0..0])
            } else {
                let slice = &body[start as usize..=end_incl as usize];
                (206, format!("bytes {}-{}/{}", start, end_incl, total), slice)
            }
        }
        None => (200, format!("bytes 0-{}/{}", total.saturating_sub(1), total), body),
    };
    let head = format!(
        "{}\r\nContent-Length: {}\r\nContent-Range: {}\r\n{}\r\n",
        status_line(status),
        slice.len(),
        content_range,
        accept_ranges
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    match opts.throttle {
        Some((piece, pause)) => {
            for part in slice.chunks(piece.max(1)) {
                if stream.write_all(part).is_err() {
                    return;
                }
                thread::sleep(pause);
            }
        }
        None => {
            let _ = stream.write_all(slice);
        }
    }
}

struct Head {
    method: String,
    /// `Range: bytes=a-b`, end inclusive; an open end reads as `u64::MAX`.
    range: Option<(u64, u64)>,
}

fn read_head(stream: &TcpStream) -> Option<Head> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let method = line.split_whitespace().next()?.to_string();
    let mut range = None;
    loop {
        line.clear();
        if reader.read_line(&mut line).ok()? == 0 || line.trim().is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("range") {
            range = value.trim().strip_prefix("bytes=").and_then(byte_range);
        }
    }
    Some(Head { method, range })
}

fn byte_range(value: &str) -> Option<(u64, u64)> {
    let (a, b) = value.split_once('-')?;
    let first = a.trim().parse().ok()?;
    let last = b.trim().parse().unwrap_or(u64::MAX);
    Some((first, last))
}
