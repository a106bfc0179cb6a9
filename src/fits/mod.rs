//! Minimal FITS reader/writer for image HDUs.
//!
//! Supports what datacube processing needs:
//! - primary HDU + any number of `IMAGE` extensions
//! - `BITPIX` 8/16/32/64/-32/-64 on read, with `BSCALE`/`BZERO`/`BLANK`
//! - float32 (`BITPIX = -32`) on write, NaN preserved
//!
//! Non-image extensions are skipped on read (their header is kept, data dropped).
//! Arrays are stored in C order, i.e. the ndarray shape is `[NAXISn, ..., NAXIS1]`.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};

use crate::error::AppError;

pub mod header;

pub use header::{Card, Header, HeaderValue};

use header::{CARD_LEN, format_card, parse_card};

/// FITS logical record size.
pub const BLOCK: usize = 2880;

#[derive(Debug, Clone)]
pub struct Hdu {
    pub header: Header,
    pub data: Option<ArrayD<f64>>,
}

impl Hdu {
    pub fn new(header: Header, data: Option<ArrayD<f64>>) -> Self {
        Self { header, data }
    }

    /// Header-only HDU (used for primary HDUs of datacubes).
    pub fn empty(header: Header) -> Self {
        Self { header, data: None }
    }
}

/// Read every HDU of a FITS file.
pub fn read_fits(path: &Path) -> Result<Vec<Hdu>, AppError> {
    let mut file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open FITS file '{}': {e}", path.display())))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| AppError::config(format!("Failed to read FITS file '{}': {e}", path.display())))?;
    decode(&bytes).map_err(|e| AppError::data(format!("Invalid FITS file '{}': {e}", path.display())))
}

/// Write HDUs to a FITS file, overwriting any existing file.
pub fn write_fits(path: &Path, hdus: &[Hdu]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::process(format!("Failed to create FITS file '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    let bytes = encode(hdus);
    writer
        .write_all(&bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| AppError::process(format!("Failed to write FITS file '{}': {e}", path.display())))
}

/// Decode a complete FITS byte stream.
pub fn decode(bytes: &[u8]) -> Result<Vec<Hdu>, String> {
    let mut hdus = Vec::new();
    let mut offset = 0usize;

    while offset + BLOCK <= bytes.len() {
        // Trailing zero padding after the last HDU is tolerated.
        if bytes[offset..offset + BLOCK].iter().all(|&b| b == 0) {
            break;
        }

        let (header, header_len) = read_header(&bytes[offset..])?;
        offset += header_len;

        let first = header.cards().first().map(|c| c.keyword.as_str()).unwrap_or("");
        if hdus.is_empty() && first != "SIMPLE" {
            return Err("first HDU does not start with SIMPLE".to_string());
        }
        if !hdus.is_empty() && first != "XTENSION" {
            return Err(format!("HDU {} does not start with XTENSION", hdus.len()));
        }

        let layout = DataLayout::from_header(&header)?;
        let data_len = layout.byte_len();
        if offset + data_len > bytes.len() {
            return Err(format!("HDU {} data truncated", hdus.len()));
        }

        let is_image = hdus.is_empty() || header.get_str("XTENSION").map(str::trim) == Some("IMAGE");
        let data = if is_image && layout.n_values() > 0 {
            Some(decode_image(&bytes[offset..offset + data_len], &layout, &header)?)
        } else {
            None
        };

        offset += padded(data_len);
        hdus.push(Hdu { header, data });
    }

    if hdus.is_empty() {
        return Err("no HDU found".to_string());
    }
    Ok(hdus)
}

/// Encode HDUs into a FITS byte stream.
pub fn encode(hdus: &[Hdu]) -> Vec<u8> {
    let mut out = Vec::new();
    for (idx, hdu) in hdus.iter().enumerate() {
        let header = structural_header(idx == 0, hdu);
        let mut text = String::new();
        for card in header.cards() {
            text.push_str(&format_card(card));
        }
        text.push_str(&format!("{:<80}", "END"));
        let mut bytes = text.into_bytes();
        bytes.resize(padded(bytes.len()), b' ');
        out.extend_from_slice(&bytes);

        if let Some(data) = &hdu.data {
            let start = out.len();
            for &v in data.iter() {
                out.extend_from_slice(&(v as f32).to_be_bytes());
            }
            let written = out.len() - start;
            out.resize(start + padded(written), 0);
        }
    }
    out
}

fn structural_header(primary: bool, hdu: &Hdu) -> Header {
    let mut header = Header::new();
    if primary {
        header.set("SIMPLE", true, Some("conforms to FITS standard"));
    } else {
        header.set("XTENSION", "IMAGE", Some("Image extension"));
    }

    let shape: Vec<usize> = hdu
        .data
        .as_ref()
        .map(|d| d.shape().iter().rev().copied().collect())
        .unwrap_or_default();

    header.set("BITPIX", if shape.is_empty() { 8 } else { -32_i64 }, Some("array data type"));
    header.set("NAXIS", shape.len() as i64, Some("number of array dimensions"));
    for (i, n) in shape.iter().enumerate() {
        header.set(&format!("NAXIS{}", i + 1), *n as i64, None);
    }
    if primary {
        header.set("EXTEND", true, None);
    } else {
        header.set("PCOUNT", 0_i64, Some("number of parameters"));
        header.set("GCOUNT", 1_i64, Some("number of groups"));
    }

    for card in hdu.header.without_structure().cards() {
        header.push_card(card.clone());
    }
    header
}

fn read_header(bytes: &[u8]) -> Result<(Header, usize), String> {
    let mut header = Header::new();
    let mut pos = 0usize;
    loop {
        if pos + CARD_LEN > bytes.len() {
            return Err("header is missing END card".to_string());
        }
        let card = parse_card(&bytes[pos..pos + CARD_LEN]);
        pos += CARD_LEN;
        if card.keyword == "END" {
            break;
        }
        header.push_card(card);
    }
    Ok((header, padded(pos)))
}

#[derive(Debug, Clone)]
struct DataLayout {
    bitpix: i64,
    /// NAXIS1..NAXISn.
    axes: Vec<usize>,
    pcount: usize,
    gcount: usize,
}

impl DataLayout {
    fn from_header(header: &Header) -> Result<Self, String> {
        let bitpix = header.get_i64("BITPIX").ok_or("missing BITPIX")?;
        if !matches!(bitpix, 8 | 16 | 32 | 64 | -32 | -64) {
            return Err(format!("unsupported BITPIX {bitpix}"));
        }
        let naxis = header.get_i64("NAXIS").ok_or("missing NAXIS")?;
        let mut axes = Vec::with_capacity(naxis.max(0) as usize);
        for i in 1..=naxis {
            let n = header
                .get_i64(&format!("NAXIS{i}"))
                .filter(|n| *n >= 0)
                .ok_or_else(|| format!("missing NAXIS{i}"))?;
            axes.push(n as usize);
        }
        let pcount = header.get_i64("PCOUNT").unwrap_or(0).max(0) as usize;
        let gcount = header.get_i64("GCOUNT").unwrap_or(1).max(1) as usize;
        Ok(Self {
            bitpix,
            axes,
            pcount,
            gcount,
        })
    }

    fn n_values(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().product()
        }
    }

    fn byte_len(&self) -> usize {
        let width = self.bitpix.unsigned_abs() as usize / 8;
        width * self.gcount * (self.pcount + self.n_values())
    }
}

fn decode_image(bytes: &[u8], layout: &DataLayout, header: &Header) -> Result<ArrayD<f64>, String> {
    let n = layout.n_values();
    let width = layout.bitpix.unsigned_abs() as usize / 8;
    let bscale = header.get_f64("BSCALE").unwrap_or(1.0);
    let bzero = header.get_f64("BZERO").unwrap_or(0.0);
    let blank = header.get_i64("BLANK");

    let mut values = Vec::with_capacity(n);
    for chunk in bytes[..n * width].chunks_exact(width) {
        let (raw, is_blank) = match layout.bitpix {
            8 => (f64::from(chunk[0]), blank == Some(i64::from(chunk[0]))),
            16 => {
                let v = i16::from_be_bytes([chunk[0], chunk[1]]);
                (f64::from(v), blank == Some(i64::from(v)))
            }
            32 => {
                let v = i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                (f64::from(v), blank == Some(i64::from(v)))
            }
            64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(chunk);
                let v = i64::from_be_bytes(b);
                (v as f64, blank == Some(v))
            }
            -32 => (
                f64::from(f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
                false,
            ),
            _ => {
                let mut b = [0u8; 8];
                b.copy_from_slice(chunk);
                (f64::from_be_bytes(b), false)
            }
        };
        values.push(if is_blank { f64::NAN } else { bzero + bscale * raw });
    }

    let shape: Vec<usize> = layout.axes.iter().rev().copied().collect();
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| format!("bad data shape: {e}"))
}

fn padded(len: usize) -> usize {
    len.div_ceil(BLOCK) * BLOCK
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;

    fn sample_cube() -> ArrayD<f64> {
        let mut cube = Array3::<f64>::zeros((3, 2, 4));
        for ((k, y, x), v) in cube.indexed_iter_mut() {
            *v = (k * 100 + y * 10 + x) as f64;
        }
        cube[[1, 1, 1]] = f64::NAN;
        cube.into_dyn()
    }

    #[test]
    fn encode_decode_preserves_layout_and_values() {
        let mut h1 = Header::new();
        h1.set("CRVAL3", 4750.0, Some("start wavelength"));
        let primary = Hdu::empty(Header::new());
        let image = Hdu::new(h1, Some(sample_cube()));

        let bytes = encode(&[primary, image]);
        assert_eq!(bytes.len() % BLOCK, 0);

        let hdus = decode(&bytes).unwrap();
        assert_eq!(hdus.len(), 2);
        assert!(hdus[0].data.is_none());

        let h = &hdus[1].header;
        assert_eq!(h.get_str("XTENSION"), Some("IMAGE"));
        assert_eq!(h.get_i64("NAXIS1"), Some(4));
        assert_eq!(h.get_i64("NAXIS2"), Some(2));
        assert_eq!(h.get_i64("NAXIS3"), Some(3));
        assert_eq!(h.get_f64("CRVAL3"), Some(4750.0));

        let data = hdus[1].data.as_ref().unwrap();
        assert_eq!(data.shape(), &[3, 2, 4]);
        assert_eq!(data[[2, 1, 3]], 213.0);
        assert!(data[[1, 1, 1]].is_nan());
    }

    #[test]
    fn integer_data_applies_scaling_and_blank() {
        let mut text = String::new();
        for card in [
            "SIMPLE  =                    T",
            "BITPIX  =                   16",
            "NAXIS   =                    1",
            "NAXIS1  =                    3",
            "BSCALE  =                  2.0",
            "BZERO   =                 10.0",
            "BLANK   =                   -1",
            "END",
        ] {
            text.push_str(&format!("{card:<80}"));
        }
        let mut bytes = text.into_bytes();
        bytes.resize(BLOCK, b' ');
        let mut data = Vec::new();
        for v in [1_i16, -1, 5] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data.resize(BLOCK, 0);
        bytes.extend_from_slice(&data);

        let hdus = decode(&bytes).unwrap();
        let values = hdus[0].data.as_ref().unwrap();
        assert_eq!(values[[0]], 12.0);
        assert!(values[[1]].is_nan());
        assert_eq!(values[[2]], 20.0);
    }

    #[test]
    fn rejects_missing_end() {
        let mut bytes = format!("{:<80}", "SIMPLE  =                    T").into_bytes();
        bytes.resize(BLOCK, b' ');
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn structural_keys_are_regenerated() {
        let mut h = Header::new();
        h.set("NAXIS", 7_i64, None);
        h.set("BITPIX", 64_i64, None);
        h.set("OBJECT", "NGC 1234", None);
        let bytes = encode(&[Hdu::empty(h)]);
        let hdus = decode(&bytes).unwrap();
        assert_eq!(hdus[0].header.get_i64("NAXIS"), Some(0));
        assert_eq!(hdus[0].header.get_i64("BITPIX"), Some(8));
        assert_eq!(hdus[0].header.get_str("OBJECT"), Some("NGC 1234"));
    }
}
