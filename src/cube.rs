//! Datacube extraction and product writing.
//!
//! In memory a cube is an `Array3<f64>` indexed `[k, y, x]` (spectral, row,
//! column), which is the FITS C-order layout of `NAXIS3 × NAXIS2 × NAXIS1`.

use std::path::Path;

use ndarray::{Array2, Array3, ArrayView3, Axis, Ix2, Ix3};

use crate::domain::Instrument;
use crate::error::AppError;
use crate::fits::{self, Hdu, Header, HeaderValue};
use crate::math::nan_sum;

/// Celestial WCS keywords carried over to every product.
pub const WCS_KEYS: [&str; 12] = [
    "CRPIX1", "CD1_1", "CTYPE1", "CUNIT1", "CRPIX2", "CD2_2", "CTYPE2", "CUNIT2", "CD1_2", "CD2_1",
    "CRVAL1", "CRVAL2",
];

/// Spectral WCS keywords carried over to every cube product.
pub const LAM_KEYS: [&str; 9] = [
    "CTYPE3", "CUNIT3", "CD3_3", "CRPIX3", "CRVAL3", "CD1_3", "CD2_3", "CD3_1", "CD3_2",
];

/// A datacube with its variance and headers.
#[derive(Debug, Clone)]
pub struct Cube {
    /// Wavelength of every spectral plane (Å).
    pub lams: Vec<f64>,
    pub data: Array3<f64>,
    pub error: Array3<f64>,
    pub header0: Header,
    pub header_data: Header,
    pub header_error: Header,
}

impl Cube {
    /// `(n_lams, n_rows, n_cols)`.
    pub fn dims(&self) -> (usize, usize, usize) {
        self.data.dim()
    }
}

/// Open a datacube laid out the way `inst` writes it.
pub fn extract_cube(path: &Path, inst: Instrument) -> Result<Cube, AppError> {
    let mut hdus = fits::read_fits(path)?;
    match inst {
        Instrument::Muse => {
            if hdus.len() < 3 {
                return Err(AppError::data(format!(
                    "'{}' has {} HDU(s); a {} cube needs primary, data and error.",
                    path.display(),
                    hdus.len(),
                    inst.display_name()
                )));
            }
            hdus.truncate(3);
            let error_hdu = hdus.pop().ok_or_else(|| AppError::data("missing error HDU"))?;
            let data_hdu = hdus.pop().ok_or_else(|| AppError::data("missing data HDU"))?;
            let primary = hdus.pop().ok_or_else(|| AppError::data("missing primary HDU"))?;

            let data = cube_array(data_hdu.data, path, "data")?;
            let error = cube_array(error_hdu.data, path, "error")?;
            if data.dim() != error.dim() {
                return Err(AppError::data(format!(
                    "'{}': data {:?} and error {:?} shapes differ.",
                    path.display(),
                    data.dim(),
                    error.dim()
                )));
            }
            let lams = wavelengths(&data_hdu.header, data.dim().0)?;

            Ok(Cube {
                lams,
                data,
                error,
                header0: primary.header,
                header_data: data_hdu.header,
                header_error: error_hdu.header,
            })
        }
    }
}

fn cube_array(data: Option<ndarray::ArrayD<f64>>, path: &Path, what: &str) -> Result<Array3<f64>, AppError> {
    let data = data.ok_or_else(|| AppError::data(format!("'{}': {what} HDU carries no array.", path.display())))?;
    data.into_dimensionality::<Ix3>()
        .map_err(|e| AppError::data(format!("'{}': {what} HDU is not a cube: {e}", path.display())))
}

/// `lam_k = (k + 1 - CRPIX3) * CD3_3 + CRVAL3`, with `CDELT3` accepted for `CD3_3`.
pub fn wavelengths(header: &Header, n: usize) -> Result<Vec<f64>, AppError> {
    let crpix = header.require_f64("CRPIX3")?;
    let crval = header.require_f64("CRVAL3")?;
    let step = header
        .get_f64("CD3_3")
        .or_else(|| header.get_f64("CDELT3"))
        .ok_or_else(|| AppError::data("Missing spectral step (`CD3_3` or `CDELT3`)."))?;
    Ok((0..n).map(|k| (k as f64 + 1.0 - crpix) * step + crval).collect())
}

/// Indices of the planes with `lo <= lam <= hi`.
pub fn spectral_slice(lams: &[f64], lo: f64, hi: f64) -> Vec<usize> {
    lams.iter()
        .enumerate()
        .filter(|(_, l)| **l >= lo && **l <= hi)
        .map(|(k, _)| k)
        .collect()
}

/// Apply `f` to the spectrum of every spaxel restricted to `planes`.
pub fn reduce_planes<F>(data: ArrayView3<'_, f64>, planes: &[usize], f: F) -> Array2<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let (_, ny, nx) = data.dim();
    let mut buf = Vec::with_capacity(planes.len());
    Array2::from_shape_fn((ny, nx), |(y, x)| {
        buf.clear();
        buf.extend(planes.iter().map(|&k| data[[k, y, x]]));
        f(&buf)
    })
}

/// NaN-sum along the spectral axis.
pub fn white_light(data: &Array3<f64>) -> Array2<f64> {
    data.map_axis(Axis(0), |spec| spec.iter().filter(|v| !v.is_nan()).sum())
}

/// NaN-sum over `[lo, hi]`, an empty band giving zeros.
pub fn band_image(lams: &[f64], data: &Array3<f64>, lo: f64, hi: f64) -> Array2<f64> {
    let planes = spectral_slice(lams, lo, hi);
    reduce_planes(data.view(), &planes, nan_sum)
}

pub fn add_wcs(header: &mut Header, reference: &Header) {
    header.copy_keys(reference, &WCS_KEYS);
}

pub fn add_lams(header: &mut Header, reference: &Header) {
    header.copy_keys(reference, &LAM_KEYS);
}

/// Record the crate version and the processing step that wrote the HDU.
pub fn add_stamp(header: &mut Header, suffix: &str) {
    header.set("BRUTIFUS", env!("CARGO_PKG_VERSION"), Some("brutifus version"));
    header.set("B_STEP", suffix, Some("brutifus processing step"));
}

/// Header of a 2-D product: celestial WCS + stamp.
pub fn image_header(reference: &Header, suffix: &str) -> Header {
    let mut header = Header::new();
    add_wcs(&mut header, reference);
    add_stamp(&mut header, suffix);
    header
}

/// Header of a cube product: celestial + spectral WCS + stamp.
pub fn cube_header(reference: &Header, suffix: &str) -> Header {
    let mut header = Header::new();
    add_wcs(&mut header, reference);
    add_lams(&mut header, reference);
    add_stamp(&mut header, suffix);
    header
}

/// Write a primary + data + error cube.
pub fn write_cube(
    path: &Path,
    header0: &Header,
    data: Array3<f64>,
    error: Array3<f64>,
    header_data: Header,
    header_error: Header,
) -> Result<(), AppError> {
    let hdus = [
        Hdu::empty(header0.without_structure()),
        Hdu::new(header_data, Some(data.into_dyn())),
        Hdu::new(header_error, Some(error.into_dyn())),
    ];
    fits::write_fits(path, &hdus)
}

/// Write a single 2-D image as the primary HDU.
pub fn write_image(path: &Path, image: Array2<f64>, header: Header) -> Result<(), AppError> {
    fits::write_fits(path, &[Hdu::new(header, Some(image.into_dyn()))])
}

/// Write a header-only primary HDU followed by one image extension per map.
pub fn write_images(path: &Path, header0: &Header, images: Vec<(Array2<f64>, Header)>) -> Result<(), AppError> {
    let mut hdus = Vec::with_capacity(images.len() + 1);
    hdus.push(Hdu::empty(header0.without_structure()));
    hdus.extend(
        images
            .into_iter()
            .map(|(image, header)| Hdu::new(header, Some(image.into_dyn()))),
    );
    fits::write_fits(path, &hdus)
}

/// Read image `ext` of a FITS file as a 2-D map.
pub fn read_image(path: &Path, ext: usize) -> Result<(Array2<f64>, Header), AppError> {
    let mut hdus = fits::read_fits(path)?;
    if ext >= hdus.len() {
        return Err(AppError::data(format!(
            "'{}' has no HDU {ext} ({} found).",
            path.display(),
            hdus.len()
        )));
    }
    let hdu = hdus.swap_remove(ext);
    let image = hdu
        .data
        .ok_or_else(|| AppError::data(format!("'{}' HDU {ext} carries no data.", path.display())))?
        .into_dimensionality::<Ix2>()
        .map_err(|e| AppError::data(format!("'{}' HDU {ext} is not an image: {e}", path.display())))?;
    Ok((image, hdu.header))
}

/// Attach `(keyword, value, comment)` triples to a header.
pub fn annotate(header: &mut Header, cards: &[(&str, HeaderValue, &str)]) {
    for (key, value, comment) in cards {
        header.set(key, value.clone(), Some(*comment));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn reference_header() -> Header {
        let mut h = Header::new();
        h.set("CRPIX1", 10.0, None);
        h.set("CRPIX2", 12.0, None);
        h.set("CRVAL1", 150.0, None);
        h.set("CRVAL2", 2.0, None);
        h.set("CD1_1", -5.5e-5, None);
        h.set("CD2_2", 5.5e-5, None);
        h.set("CD1_2", 0.0, None);
        h.set("CD2_1", 0.0, None);
        h.set("CTYPE1", "RA---TAN", None);
        h.set("CTYPE2", "DEC--TAN", None);
        h.set("CUNIT1", "deg", None);
        h.set("CUNIT2", "deg", None);
        h.set("CTYPE3", "AWAV", None);
        h.set("CUNIT3", "Angstrom", None);
        h.set("CRPIX3", 1.0, None);
        h.set("CRVAL3", 4750.0, None);
        h.set("CD3_3", 1.25, None);
        h.set("OBJECT", "NGC0000", None);
        h
    }

    #[test]
    fn wavelength_axis_from_header() {
        let h = reference_header();
        let lams = wavelengths(&h, 4).unwrap();
        assert_eq!(lams, vec![4750.0, 4751.25, 4752.5, 4753.75]);

        let mut h = Header::new();
        h.set("CRPIX3", 2.0, None);
        h.set("CRVAL3", 5000.0, None);
        h.set("CDELT3", 2.0, None);
        assert_eq!(wavelengths(&h, 2).unwrap(), vec![4998.0, 5000.0]);
    }

    #[test]
    fn product_headers_copy_only_wcs_and_stamp() {
        let h = image_header(&reference_header(), "05");
        assert_eq!(h.get_f64("CRPIX1"), Some(10.0));
        assert!(!h.contains("CRVAL3"));
        assert!(!h.contains("OBJECT"));
        assert_eq!(h.get_str("B_STEP"), Some("05"));
        assert_eq!(h.get_str("BRUTIFUS"), Some(env!("CARGO_PKG_VERSION")));

        let c = cube_header(&reference_header(), "05");
        assert_eq!(c.get_f64("CD3_3"), Some(1.25));
        // Keys missing from the reference are skipped.
        assert!(!c.contains("CD1_3"));
    }

    #[test]
    fn cube_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.fits");

        let mut data = Array3::<f64>::from_elem((4, 3, 2), 1.0);
        data[[0, 0, 0]] = f64::NAN;
        let error = Array3::<f64>::from_elem((4, 3, 2), 0.5);
        let mut header0 = Header::new();
        header0.set("DATE-OBS", "2019-03-04T05:06:07.000", None);

        let h = cube_header(&reference_header(), "00");
        write_cube(&path, &header0, data, error, h.clone(), h).unwrap();

        let cube = extract_cube(&path, Instrument::Muse).unwrap();
        assert_eq!(cube.dims(), (4, 3, 2));
        assert_eq!(cube.lams[3], 4753.75);
        assert!(cube.data[[0, 0, 0]].is_nan());
        assert_eq!(cube.error[[3, 2, 1]], 0.5);
        assert_eq!(cube.header0.get_str("DATE-OBS"), Some("2019-03-04T05:06:07.000"));

        let wl = white_light(&cube.data);
        assert_eq!(wl[[0, 0]], 3.0);
        assert_eq!(wl[[2, 1]], 4.0);
        let band = band_image(&cube.lams, &cube.data, 4751.0, 4753.0);
        assert_eq!(band[[1, 1]], 2.0);
    }

    #[test]
    fn single_hdu_file_is_not_a_cube() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.fits");
        write_image(&path, Array2::zeros((2, 2)), Header::new()).unwrap();
        let err = extract_cube(&path, Instrument::Muse).unwrap_err();
        assert_eq!(err.exit_code(), 3);

        let (img, _) = read_image(&path, 0).unwrap();
        assert_eq!(img.dim(), (2, 2));
    }
}
