//! `dive kas-locality`.

use std::path::Path;

use anyhow::{Context, Result};
use dive_config::DiveConfig;
use dive_kas::is_external_kas;

pub fn locality(dir: &Path, kas_url: &str, local_kas: Option<&str>) -> Result<()> {
    let configured;
    let local = match local_kas {
        Some(url) => Some(url),
        None => {
            configured = DiveConfig::load_from_dir(dir)
                .context("Failed to load configuration")?
                .instance
                .kas_url;
            configured.as_deref()
        }
    };

    println!("{}", classify(kas_url, local));
    Ok(())
}

fn classify(kas_url: &str, local_kas: Option<&str>) -> &'static str {
    tracing::debug!(kas_url, local_kas = ?local_kas, "classifying KAS");
    if is_external_kas(kas_url, local_kas) {
        "external"
    } else {
        "local"
    }
}
