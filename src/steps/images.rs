//! Black & white and RGB images built from spectral bands.

use ndarray::{Array2, Array3};
use serde::Deserialize;
use tracing::info;

use super::{StepContext, cycled};
use crate::cube::{self, band_image, extract_cube, image_header};
use crate::error::AppError;
use crate::io::FnList;
use crate::plot::{ChannelOptions, MapOptions, Stretch, plot_map, plot_rgb};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlotBwArgs {
    pub name_in: String,
    /// `[lam_min, lam_max]` per image.
    #[serde(default = "default_bw_bands")]
    pub bands: Vec<[f64; 2]>,
    /// Continuum band subtracted from each image; `null` bounds disable it.
    #[serde(default = "default_bw_conts")]
    pub conts: Vec<[Option<f64>; 2]>,
    #[serde(default = "default_stretches")]
    pub stretches: Vec<Stretch>,
    #[serde(default = "default_bw_plims")]
    pub plims: Vec<[f64; 2]>,
    #[serde(default = "default_bw_vlims")]
    pub vlims: Vec<[Option<f64>; 2]>,
    #[serde(default = "default_blurs")]
    pub gauss_blurs: Vec<Option<f64>>,
}

fn default_bw_bands() -> Vec<[f64; 2]> {
    vec![[7500.0, 9300.0]]
}

fn default_bw_conts() -> Vec<[Option<f64>; 2]> {
    vec![[None, None]]
}

fn default_stretches() -> Vec<Stretch> {
    vec![Stretch::Arcsinh]
}

fn default_bw_plims() -> Vec<[f64; 2]> {
    vec![[10.0, 99.5]]
}

fn default_bw_vlims() -> Vec<[Option<f64>; 2]> {
    vec![[None, None]]
}

fn default_blurs() -> Vec<Option<f64>> {
    vec![None]
}

/// Continuum bands of an RGB set: three `[lo, hi]` pairs, flattened.
///
/// `[null, null, null]` is accepted as "no continuum" for every channel.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "Vec<Option<f64>>")]
pub struct RgbConts(pub [Option<f64>; 6]);

impl TryFrom<Vec<Option<f64>>> for RgbConts {
    type Error = String;

    fn try_from(v: Vec<Option<f64>>) -> Result<Self, Self::Error> {
        match v.len() {
            6 => {
                let mut out = [None; 6];
                out.copy_from_slice(&v);
                Ok(RgbConts(out))
            }
            3 if v.iter().all(Option::is_none) => Ok(RgbConts([None; 6])),
            n => Err(format!("RGB continuum bands need 6 values, got {n}")),
        }
    }
}

impl RgbConts {
    fn channel(&self, j: usize) -> [Option<f64>; 2] {
        [self.0[2 * j], self.0[2 * j + 1]]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlotRgbArgs {
    pub name_in: String,
    /// `[r_min, r_max, g_min, g_max, b_min, b_max]` per image.
    #[serde(default = "default_rgb_bands")]
    pub bands: Vec<[f64; 6]>,
    #[serde(default = "default_rgb_conts")]
    pub conts: Vec<RgbConts>,
    #[serde(default = "default_rgb_stretches")]
    pub stretches: Vec<[Stretch; 3]>,
    #[serde(default = "default_rgb_plims")]
    pub plims: Vec<[f64; 6]>,
    #[serde(default = "default_rgb_vlims")]
    pub vlims: Vec<[Option<f64>; 6]>,
    #[serde(default = "default_rgb_blurs")]
    pub gauss_blurs: Vec<[Option<f64>; 3]>,
}

fn default_rgb_bands() -> Vec<[f64; 6]> {
    vec![[7500.0, 9300.0, 6000.0, 7500.0, 4800.0, 6000.0]]
}

fn default_rgb_conts() -> Vec<RgbConts> {
    vec![RgbConts([None; 6])]
}

fn default_rgb_stretches() -> Vec<[Stretch; 3]> {
    vec![[Stretch::Arcsinh; 3]]
}

fn default_rgb_plims() -> Vec<[f64; 6]> {
    vec![[10.0, 99.5, 10.0, 99.5, 10.0, 99.5]]
}

fn default_rgb_vlims() -> Vec<[Option<f64>; 6]> {
    vec![[None; 6]]
}

fn default_rgb_blurs() -> Vec<[Option<f64>; 3]> {
    vec![[None; 3]]
}

fn check_band(lo: f64, hi: f64) -> Result<(), String> {
    if lo < hi {
        Ok(())
    } else {
        Err(format!("band [{lo}, {hi}] must satisfy lo < hi"))
    }
}

fn check_lists(lens: &[(&str, usize)]) -> Result<(), String> {
    match lens.iter().find(|(_, n)| *n == 0) {
        Some((name, _)) => Err(format!("`{name}` must not be empty")),
        None => Ok(()),
    }
}

impl PlotBwArgs {
    pub fn validate(&self) -> Result<(), String> {
        check_lists(&[
            ("bands", self.bands.len()),
            ("conts", self.conts.len()),
            ("stretches", self.stretches.len()),
            ("plims", self.plims.len()),
            ("vlims", self.vlims.len()),
            ("gauss_blurs", self.gauss_blurs.len()),
        ])?;
        self.bands.iter().try_for_each(|b| check_band(b[0], b[1]))
    }
}

impl PlotRgbArgs {
    pub fn validate(&self) -> Result<(), String> {
        check_lists(&[
            ("bands", self.bands.len()),
            ("conts", self.conts.len()),
            ("stretches", self.stretches.len()),
            ("plims", self.plims.len()),
            ("vlims", self.vlims.len()),
            ("gauss_blurs", self.gauss_blurs.len()),
        ])?;
        self.bands
            .iter()
            .flat_map(|b| [(b[0], b[1]), (b[2], b[3]), (b[4], b[5])])
            .try_for_each(|(lo, hi)| check_band(lo, hi))
    }
}

/// Band image minus its continuum image when both continuum bounds are set.
fn band_minus_continuum(lams: &[f64], data: &Array3<f64>, band: [f64; 2], cont: [Option<f64>; 2]) -> Array2<f64> {
    let image = band_image(lams, data, band[0], band[1]);
    match cont {
        [Some(lo), Some(hi)] => image - band_image(lams, data, lo, hi),
        _ => image,
    }
}

pub fn run_plot_bw(fn_list: FnList, ctx: &StepContext<'_>, args: &PlotBwArgs) -> Result<FnList, AppError> {
    info!(count = args.bands.len(), "creating B&W images");
    let cube = extract_cube(fn_list.require(&args.name_in)?, ctx.params.inst)?;

    for (i, band) in args.bands.iter().enumerate() {
        let image = band_minus_continuum(&cube.lams, &cube.data, *band, cycled(&args.conts, i));

        let tag = format!("{}_BW_{:.0}-{:.0}", args.name_in, band[0].trunc(), band[1].trunc());
        cube::write_image(
            &ctx.product_path(&tag),
            image.clone(),
            image_header(&cube.header_data, ctx.suffix),
        )?;

        let opts = MapOptions {
            scale: ChannelOptions {
                stretch: cycled(&args.stretches, i),
                plims: cycled(&args.plims, i),
                vlims: cycled(&args.vlims, i),
                gauss_blur: cycled(&args.gauss_blurs, i),
            },
            ..MapOptions::default()
        };
        plot_map(&ctx.plot_path(&tag), &image, &opts, None, ctx.style)?;
    }

    Ok(fn_list)
}

pub fn run_plot_rgb(fn_list: FnList, ctx: &StepContext<'_>, args: &PlotRgbArgs) -> Result<FnList, AppError> {
    info!(count = args.bands.len(), "creating RGB images");
    let cube = extract_cube(fn_list.require(&args.name_in)?, ctx.params.inst)?;

    for (i, band) in args.bands.iter().enumerate() {
        let conts = cycled(&args.conts, i);
        let stretches = cycled(&args.stretches, i);
        let plims = cycled(&args.plims, i);
        let vlims = cycled(&args.vlims, i);
        let blurs = cycled(&args.gauss_blurs, i);

        let channels: Vec<Array2<f64>> = (0..3)
            .map(|j| band_minus_continuum(&cube.lams, &cube.data, [band[2 * j], band[2 * j + 1]], conts.channel(j)))
            .collect();
        let opts = [0usize, 1, 2].map(|j| ChannelOptions {
            stretch: stretches[j],
            plims: [plims[2 * j], plims[2 * j + 1]],
            vlims: [vlims[2 * j], vlims[2 * j + 1]],
            gauss_blur: blurs[j],
        });

        let b = band.map(f64::trunc);
        let tag = format!(
            "{}_RGB_{:.0}-{:.0}_{:.0}-{:.0}_{:.0}-{:.0}",
            args.name_in, b[0], b[1], b[2], b[3], b[4], b[5]
        );
        let title = format!(
            "R: {}-{} Å  G: {}-{} Å  B: {}-{} Å",
            band[0], band[1], band[2], band[3], band[4], band[5]
        );
        plot_rgb(
            &ctx.plot_path(&tag),
            [&channels[0], &channels[1], &channels[2]],
            opts,
            Some(&title),
            ctx.style,
        )?;
    }

    Ok(fn_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::read_image;
    use crate::steps::testutil::{params_in, registry_with_cube};

    fn ramp_cube() -> Array3<f64> {
        // 40 planes from 4750 Å in 1.25 Å steps; plane k holds k everywhere.
        Array3::from_shape_fn((40, 5, 6), |(k, y, x)| k as f64 + 0.01 * (x + y) as f64)
    }

    #[test]
    fn bw_args_defaults_and_validation() {
        let args: PlotBwArgs = serde_yaml::from_str("name_in: raw_cube").unwrap();
        assert_eq!(args.bands, vec![[7500.0, 9300.0]]);
        assert_eq!(args.stretches, vec![Stretch::Arcsinh]);
        assert!(args.validate().is_ok());

        let bad: PlotBwArgs = serde_yaml::from_str("name_in: x\nbands: [[5000, 4000]]").unwrap();
        assert!(bad.validate().is_err());
        let empty: PlotBwArgs = serde_yaml::from_str("name_in: x\nstretches: []").unwrap();
        assert!(empty.validate().is_err());
        assert!(serde_yaml::from_str::<PlotBwArgs>("name_in: x\ncolour: red").is_err());
    }

    #[test]
    fn rgb_conts_accept_three_nulls() {
        let args: PlotRgbArgs = serde_yaml::from_str(
            "name_in: x\nconts: [[null, null, null], [1, 2, null, null, 5, 6]]",
        )
        .unwrap();
        assert_eq!(args.conts[0], RgbConts([None; 6]));
        assert_eq!(args.conts[1].channel(2), [Some(5.0), Some(6.0)]);
        assert!(serde_yaml::from_str::<PlotRgbArgs>("name_in: x\nconts: [[1, 2, 3]]").is_err());
    }

    #[test]
    fn bw_image_subtracts_continuum() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "");
        let fn_list = registry_with_cube(&params, ramp_cube());
        let args: PlotBwArgs = serde_yaml::from_str(
            "name_in: raw_cube\nbands: [[4750, 4752.6], [4760, 4761]]\nconts: [[4770, 4772.6]]\nstretches: [linear, sqrt]",
        )
        .unwrap();

        let ctx = StepContext::new(&params, "02");
        run_plot_bw(fn_list, &ctx, &args).unwrap();

        // Band planes 0..=2, continuum planes 16..=18 (cycled to both bands).
        let (img, header) = read_image(&params.product_path("02", "raw_cube_BW_4750-4752"), 0).unwrap();
        assert!((img[[0, 0]] - ((0.0 + 1.0 + 2.0) - (16.0 + 17.0 + 18.0))).abs() < 1e-3);
        assert_eq!(header.get_str("B_STEP"), Some("02"));
        assert!(params.product_path("02", "raw_cube_BW_4760-4761").is_file());
        assert!(params.plot_path("02", "raw_cube_BW_4750-4752").is_file());
    }

    #[test]
    fn rgb_leaves_only_the_figure() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path(), "");
        let fn_list = registry_with_cube(&params, ramp_cube());
        let args: PlotRgbArgs =
            serde_yaml::from_str("name_in: raw_cube\nbands: [[4780, 4790, 4765, 4775, 4750, 4760]]").unwrap();

        run_plot_rgb(fn_list, &StepContext::new(&params, "03"), &args).unwrap();
        assert!(params.plot_path("03", "raw_cube_RGB_4780-4790_4765-4775_4750-4760").is_file());
        let products: Vec<_> = std::fs::read_dir(&params.prod_loc).unwrap().collect();
        assert!(products.is_empty());
    }
}
