//! Crude signal-to-noise maps.

use ndarray::Array2;
use serde::Deserialize;
use tracing::{info, warn};

use super::StepContext;
use crate::cube::{self, extract_cube, image_header, reduce_planes, spectral_slice};
use crate::domain::SnrKind;
use crate::error::AppError;
use crate::fits::HeaderValue;
use crate::io::FnList;
use crate::math::{nan_max, nan_median, nan_std};
use crate::plot::{ChannelOptions, Colormap, MapOptions, Stretch, plot_map};

/// Registry key of the S/N maps.
pub const SNR_MAPS: &str = "snr_maps";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnrMapsArgs {
    pub name_in: String,
    /// Shift the wavelengths to the rest frame of the target first.
    #[serde(default)]
    pub zcorr_lams: bool,
}

/// 1 where a spaxel has any finite value, NaN elsewhere.
pub fn coverage_map(data: &ndarray::Array3<f64>) -> Array2<f64> {
    let all: Vec<usize> = (0..data.dim().0).collect();
    reduce_planes(data.view(), &all, |spec| {
        if spec.iter().any(|v| !v.is_nan()) { 1.0 } else { f64::NAN }
    })
}

/// S/N over `planes`: signal (median or max) over standard deviation, clipped at 0.
pub fn snr_map(data: &ndarray::Array3<f64>, planes: &[usize], kind: SnrKind) -> Array2<f64> {
    reduce_planes(data.view(), planes, |spec| {
        let signal = match kind {
            SnrKind::Continuum => nan_median(spec),
            SnrKind::Emission => nan_max(spec),
        };
        let snr = signal / nan_std(spec);
        if snr < 0.0 { 0.0 } else { snr }
    })
}

pub fn run_crude_snr_maps(mut fn_list: FnList, ctx: &StepContext<'_>, args: &SnrMapsArgs) -> Result<FnList, AppError> {
    let params = ctx.params;
    info!(ranges = params.snr_ranges.len(), "computing the S/N maps");

    let cube = extract_cube(fn_list.require(&args.name_in)?, params.inst)?;
    let mut lams = cube.lams.clone();
    if args.zcorr_lams {
        let z = params.require_redshift()?;
        lams.iter_mut().for_each(|l| *l /= 1.0 + z);
    }

    let coverage = coverage_map(&cube.data);
    let mut maps = Vec::with_capacity(params.snr_ranges.len() + 1);

    let mut header = image_header(&cube.header_data, ctx.suffix);
    let (first, last) = (lams.first().copied().unwrap_or(f64::NAN), lams.last().copied().unwrap_or(f64::NAN));
    cube::annotate(
        &mut header,
        &[
            ("B_SNRANG", HeaderValue::from(format!("{first:.1}-{last:.1}")), "spectral range (A) used for SNR"),
            ("B_SNTYPE", HeaderValue::from("x"), "binary map: NaN= no data, 1 = valid spectra"),
        ],
    );
    maps.push((coverage, header));

    for range in &params.snr_ranges {
        let planes = spectral_slice(&lams, range.lam_min, range.lam_max);
        let map = if planes.is_empty() {
            warn!(
                range = %range.label(),
                cube = %format!("{first:.1}-{last:.1}"),
                "S/N range holds no spectral plane, writing an empty map"
            );
            Array2::from_elem((cube.data.dim().1, cube.data.dim().2), f64::NAN)
        } else {
            snr_map(&cube.data, &planes, range.kind)
        };

        let mut header = image_header(&cube.header_data, ctx.suffix);
        cube::annotate(
            &mut header,
            &[
                ("B_SNRANG", HeaderValue::from(range.label()), "spectral range (A) used for SNR"),
                ("B_SNTYPE", HeaderValue::from(range.kind.code()), "\"c\"ontinuum, or \"e\"mission"),
            ],
        );
        maps.push((map, header));
    }

    let path = ctx.product_path("snr-maps");
    cube::write_images(&path, &cube.header0, maps.clone())?;
    fn_list.insert(SNR_MAPS, path);

    let fixed = |lo: f64, hi: f64| ChannelOptions {
        stretch: Stretch::Linear,
        vlims: [Some(lo), Some(hi)],
        ..ChannelOptions::default()
    };

    let (coverage, _) = &maps[0];
    let opts = MapOptions {
        scale: fixed(0.0, 1.5),
        ..MapOptions::default()
    };
    plot_map(&ctx.plot_path("valid_spectra"), coverage, &opts, None, ctx.style)?;

    for (range, (map, _)) in params.snr_ranges.iter().zip(maps.iter().skip(1)) {
        let opts = MapOptions {
            scale: fixed(0.0, 50.0),
            colormap: Colormap::Heat,
            title: None,
            cblabel: Some(format!("S/N ('{}') {:.1}Å-{:.1}Å", range.kind.code(), range.lam_min, range.lam_max)),
        };
        plot_map(&ctx.plot_path(&format!("snr_{}", range.label())), map, &opts, None, ctx.style)?;
    }

    Ok(fn_list)
}
