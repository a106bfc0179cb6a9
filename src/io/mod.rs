//! Input/output helpers besides FITS.
//!
//! - filename registry JSON (`fn_list`)
//! - continuum-fit checkpoints (`checkpoint`)
//! - astrometric reference catalogs (`catalog`)

pub mod catalog;
pub mod checkpoint;
pub mod fn_list;

pub use catalog::{CatalogStar, decimal_year, read_catalog};
pub use checkpoint::{ColumnFit, checkpoint_path, checkpoint_stem, read_checkpoint, write_checkpoint};
pub use fn_list::{FnList, RAW_CUBE};
