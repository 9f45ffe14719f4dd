#![allow(dead_code)]

//! Shared fixtures: synthetic cpio and XAR archives and a hand-rolled HTTP
//! server that understands HEAD, byte-range GET and one redirect hop.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use sha1::{Digest, Sha1};
use sha2::Sha256;

// --- cpio -----------------------------------------------------------------

pub fn cpio_record(out: &mut Vec<u8>, mode: u32, name: &str, body: &[u8]) {
    out.extend_from_slice(b"070707");
    push_octal(out, 6, 0); // dev
    push_octal(out, 6, 0); // ino
    push_octal(out, 6, mode as u64);
    push_octal(out, 6, 0); // uid
    push_octal(out, 6, 0); // gid
    push_octal(out, 6, 1); // nlink
    push_octal(out, 6, 0); // rdev
    push_octal(out, 11, 0); // mtime
    push_octal(out, 6, name.len() as u64 + 1);
    push_octal(out, 11, body.len() as u64);
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    out.extend_from_slice(body);
}

pub fn cpio_trailer(out: &mut Vec<u8>) {
    cpio_record(out, 0, "TRAILER!!!", b"");
}

fn push_octal(out: &mut Vec<u8>, width: usize, value: u64) {
    out.extend_from_slice(format!("{:0width$o}", value, width = width).as_bytes());
}

/// A small archive: one directory, two files and two symlinks.
pub fn sample_cpio() -> Vec<u8> {
    let mut archive = Vec::new();
    cpio_record(&mut archive, 0o40755, ".", b"");
    cpio_record(&mut archive, 0o40755, "./sub", b"");
    cpio_record(&mut archive, 0o100644, "./a.txt", b"alpha\n");
    cpio_record(&mut archive, 0o100644, "./sub/b.txt", b"beta\n");
    cpio_record(&mut archive, 0o120777, "./short", b"abc");
    cpio_record(&mut archive, 0o120777, "./long", b"abcdefghij");
    cpio_trailer(&mut archive);
    archive
}

// --- XAR ------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum XarCompression {
    Stored,
    Gzip,
    Bzip2,
}

pub struct XarTestEntry {
    pub name: &'static str,
    pub data: Vec<u8>,
    pub compression: XarCompression,
    pub checksummed: bool,
}

/// Assembles a complete container: header, zlib TOC, heap.
pub fn build_xar(entries: &[XarTestEntry]) -> Vec<u8> {
    let mut heap = Vec::new();
    let mut files = String::new();

    for (id, entry) in entries.iter().enumerate() {
        let stored = match entry.compression {
            XarCompression::Stored => entry.data.clone(),
            XarCompression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&entry.data).unwrap();
                encoder.finish().unwrap()
            }
            XarCompression::Bzip2 => {
                let mut out = b"BZ".to_vec();
                let mut encoder =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder.write_all(&entry.data).unwrap();
                out.extend_from_slice(&encoder.finish().unwrap());
                out
            }
        };
        let style = match entry.compression {
            XarCompression::Stored => "application/octet-stream",
            XarCompression::Gzip => "application/x-gzip",
            XarCompression::Bzip2 => "application/x-bzip2",
        };
        let checksum = if entry.checksummed {
            format!(
                "<extracted-checksum style=\"sha1\">{}</extracted-checksum>",
                hex::encode(Sha1::digest(&entry.data))
            )
        } else {
            String::new()
        };
        files.push_str(&format!(
            "<file id=\"{}\"><name>{}</name><type>file</type><data>\
             <offset>{}</offset><length>{}</length><size>{}</size>\
             <encoding style=\"{}\"/>{}</data></file>",
            id + 1,
            entry.name,
            heap.len(),
            stored.len(),
            entry.data.len(),
            style,
            checksum,
        ));
        heap.extend_from_slice(&stored);
    }

    let toc = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><xar><toc>{}</toc></xar>",
        files
    );
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(toc.as_bytes()).unwrap();
    let compressed_toc = encoder.finish().unwrap();

    let mut out = Vec::new();
    out.extend_from_slice(&0x7861_7221u32.to_be_bytes());
    out.extend_from_slice(&28u16.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&(compressed_toc.len() as u64).to_be_bytes());
    out.extend_from_slice(&(toc.len() as u64).to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes()); // sha1
    out.extend_from_slice(&compressed_toc);
    out.extend_from_slice(&heap);
    out
}

/// Absolute offset of the heap within a container built by [`build_xar`].
pub fn heap_start(container: &[u8]) -> usize {
    let compressed_toc = u64::from_be_bytes(container[8..16].try_into().unwrap());
    28 + compressed_toc as usize
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn leak(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

// --- HTTP fixture ---------------------------------------------------------

pub struct TestServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn saw_range_request(&self) -> bool {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .any(|request| request.to_ascii_lowercase().contains("range: bytes="))
    }
}

/// Serves `payload` at `/container`, with `/redirect` bouncing to it.
pub fn serve(payload: Vec<u8>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let Some(request) = read_request(&mut stream) else {
                continue;
            };
            log.lock().unwrap().push(request.clone());
            respond(&mut stream, &request, &payload);
        }
    });

    TestServer {
        base_url: format!("http://{}", addr),
        requests,
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<String> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => raw.extend_from_slice(&buf[..n]),
        }
        if raw.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    if raw.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&raw).into_owned())
    }
}

fn respond(stream: &mut std::net::TcpStream, request: &str, payload: &[u8]) {
    let mut parts = request.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    let range_start = request.lines().find_map(|line| {
        let rest = line.to_ascii_lowercase();
        let rest = rest.strip_prefix("range: bytes=")?;
        rest.split('-').next()?.parse::<u64>().ok()
    });

    let _ = match (method, path) {
        ("HEAD", "/container") => write!(
            stream,
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        ),
        ("GET", "/container") => {
            let start = (range_start.unwrap_or(0) as usize).min(payload.len());
            let body = &payload[start..];
            let status = if range_start.is_some() {
                "206 Partial Content"
            } else {
                "200 OK"
            };
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            )
            .and_then(|_| stream.write_all(body))
        }
        (_, "/redirect") => write!(
            stream,
            "HTTP/1.1 302 Found\r\nLocation: /container\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        ),
        _ => write!(
            stream,
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        ),
    };
    let _ = stream.flush();
}
