//! `dive config`.

use std::path::Path;

use anyhow::{Context, Result};
use dive_config::DiveConfig;

pub fn show(dir: &Path) -> Result<()> {
    let config = DiveConfig::load_from_dir(dir).context("Failed to load configuration")?;
    print!("{}", config.to_toml().context("Failed to render configuration")?);
    Ok(())
}
