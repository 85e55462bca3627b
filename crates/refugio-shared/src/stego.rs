//! Hidden-data analysis for uploaded files.
//!
//! Three families of heuristics run in order:
//!
//! 1. Shannon entropy of the whole buffer. Compressed or encrypted payloads
//!    push entropy toward 8 bits per byte.
//! 2. Image checks, applied when the file name carries an image extension:
//!    oversized embedded metadata (EXIF, ICC profile) and the
//!    least-significant-bit transition ratio across the decoded pixels.
//! 3. A mid-file sweep for embedded container signatures (ZIP, RAR, PDF) at
//!    coarse offsets. Offset zero is never inspected: a leading magic number
//!    is just the file's own format.
//!
//! [`inspect`] is pure. It never touches the filesystem and holds no state,
//! so it can run on an isolated worker thread and a crash there loses
//! nothing but the verdict.

use crate::types::ScanReport;

/// EXIF payloads above this many bytes are suspicious.
const EXIF_LIMIT: usize = 10_000;

/// ICC profiles above this many bytes are suspicious.
const ICC_LIMIT: usize = 5_000;

/// LSB transition ratios above this are suspicious.
const LSB_RATIO_LIMIT: f64 = 0.55;

/// Distance between offsets probed by the signature sweep.
const SIGNATURE_STRIDE: usize = 1_000;

const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const RAR_MAGIC: &[u8] = b"Rar!";
const PDF_MAGIC: &[u8] = b"%PDF";

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Shannon entropy of a byte buffer, in bits per byte (0.0..=8.0).
///
/// An empty buffer has entropy zero.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in counts.iter() {
        if count == 0 {
            continue;
        }
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }
    entropy
}

/// Ratio of least-significant-bit transitions between adjacent bytes of
/// decoded pixel data. Dense LSB embedding drives this toward coin-flip
/// noise; natural photos sit lower.
pub fn lsb_transition_ratio(pixels: &[u8]) -> f64 {
    if pixels.is_empty() {
        return 0.0;
    }

    let transitions = pixels
        .windows(2)
        .filter(|pair| (pair[0] ^ pair[1]) & 1 == 1)
        .count();
    transitions as f64 / pixels.len() as f64
}

/// Container signatures found at coarse offsets past the start of the
/// buffer, as `(label, offset)` pairs. At most one hit per signature.
pub fn embedded_signatures(data: &[u8]) -> Vec<(&'static str, usize)> {
    let signatures: [(&'static str, &[u8]); 3] =
        [("ZIP", ZIP_MAGIC), ("RAR", RAR_MAGIC), ("PDF", PDF_MAGIC)];

    let mut hits = Vec::new();
    for (label, magic) in signatures {
        let mut offset = SIGNATURE_STRIDE;
        while offset + magic.len() < data.len() {
            if &data[offset..offset + magic.len()] == magic {
                hits.push((label, offset));
                break;
            }
            offset += SIGNATURE_STRIDE;
        }
    }
    hits
}

fn is_image_name(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    matches!(
        lower.rsplit_once('.').map(|(_, ext)| ext),
        Some("jpg" | "jpeg" | "png" | "gif")
    )
}

/// Embedded metadata payload sizes found in an image file.
#[derive(Debug, Default, PartialEq, Eq)]
struct MetadataSizes {
    exif: usize,
    icc: usize,
}

/// Walk JPEG marker segments, totaling EXIF (APP1) and ICC profile (APP2)
/// payloads. Stops at start-of-scan; entropy-coded data follows it.
fn jpeg_metadata_sizes(data: &[u8]) -> MetadataSizes {
    let mut sizes = MetadataSizes::default();
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return sizes;
    }

    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            break;
        }
        let marker = data[i + 1];
        // Standalone markers carry no length word.
        if (0xD0..=0xD9).contains(&marker) || marker == 0x01 {
            i += 2;
            continue;
        }
        if marker == 0xDA {
            break;
        }

        let seg_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if seg_len < 2 || i + 2 + seg_len > data.len() {
            break;
        }

        let payload = &data[i + 4..i + 2 + seg_len];
        match marker {
            0xE1 if payload.starts_with(b"Exif\0\0") => {
                sizes.exif += payload.len() - 6;
            }
            // "ICC_PROFILE\0" plus chunk index and chunk count bytes.
            0xE2 if payload.starts_with(b"ICC_PROFILE\0") => {
                sizes.icc += payload.len().saturating_sub(14);
            }
            _ => {}
        }
        i += 2 + seg_len;
    }
    sizes
}

/// Walk PNG chunks, totaling eXIf and iCCP payloads.
fn png_metadata_sizes(data: &[u8]) -> MetadataSizes {
    let mut sizes = MetadataSizes::default();
    if !data.starts_with(PNG_SIGNATURE) {
        return sizes;
    }

    let mut i = PNG_SIGNATURE.len();
    while i + 8 <= data.len() {
        let chunk_len =
            u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]) as usize;
        let kind = &data[i + 4..i + 8];
        if i + 8 + chunk_len > data.len() {
            break;
        }

        match kind {
            b"eXIf" => sizes.exif += chunk_len,
            b"iCCP" => sizes.icc += chunk_len,
            b"IEND" => break,
            _ => {}
        }
        // Payload plus the trailing CRC word.
        i += 8 + chunk_len + 4;
    }
    sizes
}

fn image_metadata_sizes(file_name: &str, data: &[u8]) -> MetadataSizes {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        png_metadata_sizes(data)
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        jpeg_metadata_sizes(data)
    } else {
        // GIF carries neither EXIF nor ICC chunks.
        MetadataSizes::default()
    }
}

/// Run every heuristic over a file and produce the verdict.
///
/// Reports from this function always have `checked = true`; the unchecked
/// state belongs to records whose analysis never completed. A failure to
/// decode an image is noted in the details but does not fail the file.
pub fn inspect(data: &[u8], file_name: &str, entropy_threshold: f64) -> ScanReport {
    let entropy = shannon_entropy(data);
    let mut details: Vec<String> = vec![format!("entropy {entropy:.2}")];
    let mut passed = true;

    if entropy > entropy_threshold {
        details.push(format!("exceeds threshold {entropy_threshold:.2}"));
        passed = false;
    }

    if is_image_name(file_name) {
        let sizes = image_metadata_sizes(file_name, data);
        if sizes.exif > EXIF_LIMIT {
            details.push(format!("oversized EXIF metadata ({} bytes)", sizes.exif));
            passed = false;
        }
        if sizes.icc > ICC_LIMIT {
            details.push(format!("oversized ICC profile ({} bytes)", sizes.icc));
            passed = false;
        }

        match image::load_from_memory(data) {
            Ok(img) => {
                let pixels = img.to_rgb8().into_raw();
                let ratio = lsb_transition_ratio(&pixels);
                if ratio > LSB_RATIO_LIMIT {
                    details.push(format!(
                        "suspicious LSB transition ratio {:.1}%",
                        ratio * 100.0
                    ));
                    passed = false;
                }
            }
            Err(e) => details.push(format!("image decode failed: {e}")),
        }
    }

    for (label, offset) in embedded_signatures(data) {
        details.push(format!("embedded {label} signature at offset {offset}"));
        passed = false;
    }

    if passed {
        details.push("no anomalies detected".to_string());
    }

    ScanReport {
        checked: true,
        passed,
        entropy,
        details: details.join("; "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A buffer cycling through all 256 byte values: entropy exactly 8.0.
    fn saturated_buffer(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    fn encode_png(img: image::ImageBuffer<image::Rgb<u8>, Vec<u8>>) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn entropy_of_empty_buffer_is_zero() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn entropy_of_uniform_buffer_is_zero() {
        assert_eq!(shannon_entropy(&[7u8; 4096]), 0.0);
    }

    #[test]
    fn entropy_of_two_equal_symbols_is_one_bit() {
        let data = [0u8, 0, 0, 0, 255, 255, 255, 255];
        assert!((shannon_entropy(&data) - 1.0).abs() < 0.01);
    }

    #[test]
    fn entropy_saturates_at_eight_bits() {
        let entropy = shannon_entropy(&saturated_buffer(4096));
        assert!((entropy - 8.0).abs() < 1e-9);
    }

    #[test]
    fn lsb_ratio_of_uniform_pixels_is_zero() {
        assert_eq!(lsb_transition_ratio(&[10u8; 100]), 0.0);
        assert_eq!(lsb_transition_ratio(&[]), 0.0);
    }

    #[test]
    fn lsb_ratio_of_alternating_pixels_is_high() {
        let pixels: Vec<u8> = (0..1000).map(|i| (i % 2) as u8).collect();
        assert!(lsb_transition_ratio(&pixels) > 0.9);
    }

    #[test]
    fn signature_sweep_probes_coarse_offsets_only() {
        let mut data = vec![0u8; 5000];
        data[3000..3004].copy_from_slice(ZIP_MAGIC);
        assert_eq!(embedded_signatures(&data), vec![("ZIP", 3000)]);

        // Off-stride plants are invisible to the sweep.
        let mut data = vec![0u8; 5000];
        data[1500..1504].copy_from_slice(ZIP_MAGIC);
        assert!(embedded_signatures(&data).is_empty());

        // A leading magic number is the file's own format, not a hit.
        let mut data = vec![0u8; 5000];
        data[..4].copy_from_slice(PDF_MAGIC);
        assert!(embedded_signatures(&data).is_empty());
    }

    #[test]
    fn signature_sweep_reports_each_container_once() {
        let mut data = vec![0u8; 8000];
        data[1000..1004].copy_from_slice(RAR_MAGIC);
        data[2000..2004].copy_from_slice(RAR_MAGIC);
        data[4000..4004].copy_from_slice(PDF_MAGIC);

        let hits = embedded_signatures(&data);
        assert_eq!(hits, vec![("RAR", 1000), ("PDF", 4000)]);
    }

    #[test]
    fn image_names_match_by_extension() {
        assert!(is_image_name("photo.jpg"));
        assert!(is_image_name("PHOTO.JPEG"));
        assert!(is_image_name("a.b.png"));
        assert!(is_image_name("anim.gif"));
        assert!(!is_image_name("jpg"));
        assert!(!is_image_name("notes.pdf"));
        assert!(!is_image_name("photo.jpg.exe"));
    }

    #[test]
    fn empty_file_passes() {
        let report = inspect(&[], "empty.bin", 7.5);
        assert!(report.checked);
        assert!(report.passed);
        assert_eq!(report.entropy, 0.0);
        assert!(report.details.contains("no anomalies"));
    }

    #[test]
    fn high_entropy_fails_the_scan() {
        let report = inspect(&saturated_buffer(4096), "blob.bin", 7.5);
        assert!(report.checked);
        assert!(!report.passed);
        assert!(report.details.contains("threshold"));
    }

    #[test]
    fn entropy_at_the_threshold_passes() {
        // Verdict is entropy <= threshold, so exactly 8.0 passes an 8.0 bar.
        let report = inspect(&saturated_buffer(4096), "blob.bin", 8.0);
        assert!(report.passed);
    }

    #[test]
    fn embedded_archive_fails_the_scan() {
        let mut data = vec![0u8; 4096];
        data[2000..2004].copy_from_slice(ZIP_MAGIC);

        let report = inspect(&data, "report.pdf", 7.5);
        assert!(!report.passed);
        assert!(report.details.contains("ZIP"));
        assert!(report.details.contains("2000"));
    }

    #[test]
    fn jpeg_segment_walk_totals_exif_payload() {
        // SOI, one APP1/Exif segment with a 64-byte body, EOI.
        let body = vec![0xAAu8; 64];
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xE1]);
        let seg_len = (2 + 6 + body.len()) as u16;
        data.extend_from_slice(&seg_len.to_be_bytes());
        data.extend_from_slice(b"Exif\0\0");
        data.extend_from_slice(&body);
        data.extend_from_slice(&[0xFF, 0xD9]);

        assert_eq!(jpeg_metadata_sizes(&data), MetadataSizes { exif: 64, icc: 0 });
        assert_eq!(jpeg_metadata_sizes(b"not a jpeg"), MetadataSizes::default());
    }

    #[test]
    fn png_chunk_walk_totals_exif_payload() {
        let payload = vec![0xBBu8; EXIF_LIMIT + 1];
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        data.extend_from_slice(b"eXIf");
        data.extend_from_slice(&payload);
        data.extend_from_slice(&[0u8; 4]); // CRC, unchecked by the walk
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"IEND");
        data.extend_from_slice(&[0u8; 4]);

        let sizes = png_metadata_sizes(&data);
        assert_eq!(sizes.exif, EXIF_LIMIT + 1);

        // Same bytes through the full inspection: flagged for metadata, with
        // the decode failure noted but not held against the file.
        let report = inspect(&data, "img.png", 7.5);
        assert!(!report.passed);
        assert!(report.details.contains("EXIF"));
        assert!(report.details.contains("image decode failed"));
    }

    #[test]
    fn clean_photo_passes_end_to_end() {
        use image::{ImageBuffer, Rgb};
        // Flat color: zero LSB transitions, tiny compressed size.
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(32, 32, |_, _| Rgb([120, 80, 40]));
        let data = encode_png(img);

        let report = inspect(&data, "flat.png", 7.5);
        assert!(report.checked);
        assert!(report.passed, "details: {}", report.details);
        assert!(!report.details.contains("decode failed"));
    }

    #[test]
    fn lsb_noise_image_fails_end_to_end() {
        use image::{ImageBuffer, Rgb};
        // Every subpixel byte alternates its low bit, the signature of
        // dense LSB embedding.
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(64, 64, |x, y| {
            let p = ((y * 64 + x) % 2) as u8;
            Rgb([100 + p, 101 - p, 100 + p])
        });
        let data = encode_png(img);

        let report = inspect(&data, "noisy.png", 8.0);
        assert!(!report.passed);
        assert!(report.details.contains("LSB"), "details: {}", report.details);
    }
}
