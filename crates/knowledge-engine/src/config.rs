//! Runtime configuration.
//!
//! Every setting can come from a flag or an environment variable.

use crate::persistence::DataDir;
use crate::render::TypstRenderer;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Directory holding the per-kind YAML collections
    #[arg(long, env = "EXAMGRAPH_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Project root handed to the typesetter (must contain src/lib.typ)
    #[arg(long, env = "EXAMGRAPH_TYPST_ROOT", default_value = ".", global = true)]
    pub typst_root: PathBuf,

    /// Where generated exams and previews are written (inside the typst root)
    #[arg(long, env = "EXAMGRAPH_OUTPUT_DIR", default_value = ".", global = true)]
    pub output_dir: PathBuf,

    /// Typst executable
    #[arg(long = "typst", env = "TYPST_BIN", default_value = "typst", global = true)]
    pub typst_bin: String,

    /// Resolution of PNG previews
    #[arg(long = "ppi", env = "EXAMGRAPH_PREVIEW_PPI", default_value_t = 144, global = true)]
    pub preview_ppi: u32,
}

impl Config {
    pub fn data(&self) -> DataDir {
        DataDir::new(&self.data_dir)
    }

    pub fn renderer(&self) -> TypstRenderer {
        TypstRenderer::new(&self.typst_bin, &self.typst_root, &self.output_dir)
            .with_ppi(self.preview_ppi)
    }
}
