//! Carrying the source's EXIF APP1 segment into a re-encoded JPEG.
//!
//! Pixels in an export are already upright, so the copied segment has
//! its IFD0 orientation reset to 1.

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const EXIF_HEADER: &[u8] = b"Exif\0";
const ORIENTATION_TAG: u16 = 0x0112;

/// Find the full APP1 Exif segment (marker, length and payload)
pub fn find_exif_segment(jpeg: &[u8]) -> Option<&[u8]> {
    segments(jpeg)
        .find(|(marker, segment)| *marker == APP1 && segment[4..].starts_with(EXIF_HEADER))
        .map(|(_, segment)| segment)
}

/// Insert `app1` after the SOI of `encoded`, dropping the encoder's own
/// APP0..APP15 segments. `None` if `encoded` is not a well-formed JPEG.
pub fn splice(encoded: &[u8], app1: &[u8]) -> Option<Vec<u8>> {
    if !encoded.starts_with(&SOI) {
        return None;
    }

    let mut rest = 2;
    for (marker, segment) in segments(encoded) {
        if !(0xE0..=0xEF).contains(&marker) {
            break;
        }
        rest += segment.len();
    }
    if rest >= encoded.len() {
        return None;
    }

    let mut out = Vec::with_capacity(encoded.len() + app1.len());
    out.extend_from_slice(&SOI);
    out.extend_from_slice(app1);
    out.extend_from_slice(&encoded[rest..]);
    Some(out)
}

/// Copy of `app1` with IFD0 orientation set to 1, when the tag is present
pub fn reset_orientation(app1: &[u8]) -> Vec<u8> {
    let mut segment = app1.to_vec();
    // marker(2) + length(2) + "Exif\0\0"(6)
    let tiff_start = 10;
    if segment.len() < tiff_start + 8 {
        return segment;
    }
    let tiff = &mut segment[tiff_start..];

    let big_endian = match &tiff[..2] {
        b"MM" => true,
        b"II" => false,
        _ => return segment,
    };
    let Some(ifd0) = read_u32(tiff, 4, big_endian).map(|o| o as usize) else {
        return segment;
    };
    let Some(count) = read_u16(tiff, ifd0, big_endian) else {
        return segment;
    };

    for i in 0..count as usize {
        let entry = ifd0 + 2 + i * 12;
        if read_u16(tiff, entry, big_endian) == Some(ORIENTATION_TAG)
            && read_u16(tiff, entry + 2, big_endian) == Some(3)
        {
            let one = if big_endian {
                1u16.to_be_bytes()
            } else {
                1u16.to_le_bytes()
            };
            if let Some(slot) = tiff.get_mut(entry + 8..entry + 10) {
                slot.copy_from_slice(&one);
            }
            break;
        }
    }
    segment
}

fn read_u16(b: &[u8], at: usize, big_endian: bool) -> Option<u16> {
    let raw: [u8; 2] = b.get(at..at + 2)?.try_into().ok()?;
    Some(if big_endian {
        u16::from_be_bytes(raw)
    } else {
        u16::from_le_bytes(raw)
    })
}

fn read_u32(b: &[u8], at: usize, big_endian: bool) -> Option<u32> {
    let raw: [u8; 4] = b.get(at..at + 4)?.try_into().ok()?;
    Some(if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    })
}

/// Iterate `(marker, segment)` pairs of the header, stopping at SOS
fn segments(jpeg: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut pos = if jpeg.starts_with(&SOI) { 2 } else { jpeg.len() };
    std::iter::from_fn(move || loop {
        if pos + 4 > jpeg.len() || jpeg[pos] != 0xFF {
            return None;
        }
        let marker = jpeg[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            SOS | EOI => return None,
            _ => {}
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        if len < 2 || pos + 2 + len > jpeg.len() {
            return None;
        }
        let segment = &jpeg[pos..pos + 2 + len];
        pos += 2 + len;
        return Some((marker, segment));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::testing;

    fn source() -> Vec<u8> {
        let tiff = testing::tiff_block("SONY", "ILCE-7M3", "2021:06:15 14:22:10", 6);
        testing::with_exif(&testing::jpeg(8, 8), &tiff)
    }

    #[test]
    fn finds_exif_segment() {
        let src = source();
        let segment = find_exif_segment(&src).unwrap();
        assert_eq!(&segment[..2], &[0xFF, 0xE1]);
        assert_eq!(&segment[4..9], b"Exif\0");
    }

    #[test]
    fn plain_jpeg_has_no_exif_segment() {
        assert!(find_exif_segment(&testing::jpeg(8, 8)).is_none());
        assert!(find_exif_segment(b"not a jpeg").is_none());
    }

    #[test]
    fn splice_places_exif_after_soi() {
        let src = source();
        let segment = find_exif_segment(&src).unwrap().to_vec();
        let encoded = testing::jpeg(4, 4);

        let out = splice(&encoded, &segment).unwrap();
        assert_eq!(&out[..2], &SOI);
        assert_eq!(&out[2..2 + segment.len()], segment.as_slice());
        let (next_marker, _) = segments(&out).nth(1).unwrap();
        assert!(!(0xE0..=0xEF).contains(&next_marker));
        assert!(image::load_from_memory(&out).is_ok());
    }

    #[test]
    fn splice_rejects_non_jpeg() {
        assert!(splice(b"PNG...", &[0xFF, 0xE1, 0, 2]).is_none());
    }

    #[test]
    fn orientation_is_reset_to_one() {
        let src = source();
        let segment = reset_orientation(find_exif_segment(&src).unwrap());
        let patched = testing::with_exif(&testing::jpeg(8, 8), &segment[10..]);

        let exif = exif::Reader::new()
            .read_from_container(&mut std::io::Cursor::new(&patched))
            .unwrap();
        let orientation = exif
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|f| f.value.get_uint(0));
        assert_eq!(orientation, Some(1));
    }
}
