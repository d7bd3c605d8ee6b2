//! Magic byte sniffing for files whose extension is not recognized.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// How many leading bytes are read for sniffing
pub const SNIFF_LEN: usize = 512;

/// A single byte in a magic pattern
#[derive(Debug, Clone, Copy)]
enum MagicByte {
    /// Exact byte value
    Exact(u8),
    /// Any byte (wildcard)
    Any,
}

impl MagicByte {
    fn matches(&self, byte: u8) -> bool {
        match self {
            MagicByte::Exact(b) => *b == byte,
            MagicByte::Any => true,
        }
    }
}

/// A byte pattern at a fixed offset, mapped to a MIME type
struct MagicPattern {
    offset: usize,
    bytes: &'static [MagicByte],
    mime: &'static str,
}

impl MagicPattern {
    fn matches(&self, buf: &[u8]) -> bool {
        let end = self.offset + self.bytes.len();
        if buf.len() < end {
            return false;
        }
        buf[self.offset..end]
            .iter()
            .zip(self.bytes)
            .all(|(byte, pattern)| pattern.matches(*byte))
    }
}

use MagicByte::{Any, Exact};

const fn ascii<const N: usize>(s: &[u8; N]) -> [MagicByte; N] {
    let mut out = [Any; N];
    let mut i = 0;
    while i < N {
        out[i] = Exact(s[i]);
        i += 1;
    }
    out
}

const JPEG: [MagicByte; 3] = [Exact(0xFF), Exact(0xD8), Exact(0xFF)];
const PNG: [MagicByte; 8] = [
    Exact(0x89), Exact(0x50), Exact(0x4E), Exact(0x47),
    Exact(0x0D), Exact(0x0A), Exact(0x1A), Exact(0x0A),
];
const GIF: [MagicByte; 4] = ascii(b"GIF8");
const TIFF_LE: [MagicByte; 4] = [Exact(0x49), Exact(0x49), Exact(0x2A), Exact(0x00)];
const TIFF_BE: [MagicByte; 4] = [Exact(0x4D), Exact(0x4D), Exact(0x00), Exact(0x2A)];
const RIFF_WEBP: [MagicByte; 12] = [
    Exact(b'R'), Exact(b'I'), Exact(b'F'), Exact(b'F'),
    Any, Any, Any, Any,
    Exact(b'W'), Exact(b'E'), Exact(b'B'), Exact(b'P'),
];
const RIFF_WAVE: [MagicByte; 12] = [
    Exact(b'R'), Exact(b'I'), Exact(b'F'), Exact(b'F'),
    Any, Any, Any, Any,
    Exact(b'W'), Exact(b'A'), Exact(b'V'), Exact(b'E'),
];
const RIFF_AVI: [MagicByte; 12] = [
    Exact(b'R'), Exact(b'I'), Exact(b'F'), Exact(b'F'),
    Any, Any, Any, Any,
    Exact(b'A'), Exact(b'V'), Exact(b'I'), Exact(b' '),
];
const FORM_AIFF: [MagicByte; 12] = [
    Exact(b'F'), Exact(b'O'), Exact(b'R'), Exact(b'M'),
    Any, Any, Any, Any,
    Exact(b'A'), Exact(b'I'), Exact(b'F'), Exact(b'F'),
];
const FTYP_HEIC: [MagicByte; 8] = ascii(b"ftypheic");
const FTYP_HEIX: [MagicByte; 8] = ascii(b"ftypheix");
const FTYP_MIF1: [MagicByte; 8] = ascii(b"ftypmif1");
const FTYP_AVIF: [MagicByte; 8] = ascii(b"ftypavif");
const FTYP_M4A: [MagicByte; 8] = ascii(b"ftypM4A ");
const FTYP_QT: [MagicByte; 8] = ascii(b"ftypqt  ");
const FTYP: [MagicByte; 4] = ascii(b"ftyp");
const MATROSKA: [MagicByte; 4] = [Exact(0x1A), Exact(0x45), Exact(0xDF), Exact(0xA3)];
const MPEG_PS: [MagicByte; 4] = [Exact(0x00), Exact(0x00), Exact(0x01), Exact(0xBA)];
const MPEG_VIDEO: [MagicByte; 4] = [Exact(0x00), Exact(0x00), Exact(0x01), Exact(0xB3)];
const FLV: [MagicByte; 3] = ascii(b"FLV");
const ID3: [MagicByte; 3] = ascii(b"ID3");
const MP3_FRAME: [MagicByte; 2] = [Exact(0xFF), Exact(0xFB)];
const FLAC: [MagicByte; 4] = ascii(b"fLaC");
const OGG: [MagicByte; 4] = ascii(b"OggS");
const PDF: [MagicByte; 4] = ascii(b"%PDF");
const RTF: [MagicByte; 5] = ascii(b"{\\rtf");
const XML: [MagicByte; 5] = ascii(b"<?xml");
const HTML: [MagicByte; 5] = ascii(b"<html");
const DOCTYPE: [MagicByte; 9] = ascii(b"<!DOCTYPE");
const BMP: [MagicByte; 2] = ascii(b"BM");

/// Ordered table. More specific patterns come before the generic ones
/// they overlap with.
static PATTERNS: &[MagicPattern] = &[
    MagicPattern { offset: 0, bytes: &JPEG, mime: "image/jpeg" },
    MagicPattern { offset: 0, bytes: &PNG, mime: "image/png" },
    MagicPattern { offset: 0, bytes: &GIF, mime: "image/gif" },
    MagicPattern { offset: 0, bytes: &TIFF_LE, mime: "image/tiff" },
    MagicPattern { offset: 0, bytes: &TIFF_BE, mime: "image/tiff" },
    MagicPattern { offset: 0, bytes: &RIFF_WEBP, mime: "image/webp" },
    MagicPattern { offset: 0, bytes: &RIFF_WAVE, mime: "audio/wav" },
    MagicPattern { offset: 0, bytes: &RIFF_AVI, mime: "video/x-msvideo" },
    MagicPattern { offset: 0, bytes: &FORM_AIFF, mime: "audio/aiff" },
    MagicPattern { offset: 4, bytes: &FTYP_HEIC, mime: "image/heic" },
    MagicPattern { offset: 4, bytes: &FTYP_HEIX, mime: "image/heic" },
    MagicPattern { offset: 4, bytes: &FTYP_MIF1, mime: "image/heif" },
    MagicPattern { offset: 4, bytes: &FTYP_AVIF, mime: "image/avif" },
    MagicPattern { offset: 4, bytes: &FTYP_M4A, mime: "audio/mp4" },
    MagicPattern { offset: 4, bytes: &FTYP_QT, mime: "video/quicktime" },
    MagicPattern { offset: 4, bytes: &FTYP, mime: "video/mp4" },
    MagicPattern { offset: 0, bytes: &MATROSKA, mime: "video/x-matroska" },
    MagicPattern { offset: 0, bytes: &MPEG_PS, mime: "video/mpeg" },
    MagicPattern { offset: 0, bytes: &MPEG_VIDEO, mime: "video/mpeg" },
    MagicPattern { offset: 0, bytes: &FLV, mime: "video/x-flv" },
    MagicPattern { offset: 0, bytes: &ID3, mime: "audio/mpeg" },
    MagicPattern { offset: 0, bytes: &MP3_FRAME, mime: "audio/mpeg" },
    MagicPattern { offset: 0, bytes: &FLAC, mime: "audio/flac" },
    MagicPattern { offset: 0, bytes: &OGG, mime: "audio/ogg" },
    MagicPattern { offset: 0, bytes: &PDF, mime: "application/pdf" },
    MagicPattern { offset: 0, bytes: &RTF, mime: "text/rtf" },
    MagicPattern { offset: 0, bytes: &XML, mime: "text/xml" },
    MagicPattern { offset: 0, bytes: &HTML, mime: "text/html" },
    MagicPattern { offset: 0, bytes: &DOCTYPE, mime: "text/html" },
    MagicPattern { offset: 0, bytes: &BMP, mime: "image/bmp" },
];

/// Identify a buffer by its leading bytes.
///
/// Falls back to `text/plain` for non-empty UTF-8 without control bytes.
pub fn sniff_bytes(buf: &[u8]) -> Option<&'static str> {
    if let Some(pattern) = PATTERNS.iter().find(|p| p.matches(buf)) {
        return Some(pattern.mime);
    }
    if looks_like_text(buf) {
        return Some("text/plain");
    }
    None
}

/// Read the head of a file and identify it
pub fn sniff_file(path: &Path) -> io::Result<Option<&'static str>> {
    let file = File::open(path)?;
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut buf)?;
    Ok(sniff_bytes(&buf))
}

fn looks_like_text(buf: &[u8]) -> bool {
    if buf.is_empty() {
        return false;
    }
    // A multi-byte sequence may be cut at the sniff boundary
    let valid = match std::str::from_utf8(buf) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && buf.len() == SNIFF_LEN,
    };
    valid
        && buf
            .iter()
            .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r' | 0x0C))
}
