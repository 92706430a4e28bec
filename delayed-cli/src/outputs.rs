//! Step outputs for downstream workflow steps.

use std::fs::OpenOptions;
use std::io::Write;

use anyhow::{Context, Result};
use delayed_core::{config::optional, ProcessEnv};

const GITHUB_OUTPUT: &str = "GITHUB_OUTPUT";

/// Append `name=value` lines to `$GITHUB_OUTPUT`, or print them when it is unset.
pub fn emit(outputs: &[(&str, String)]) -> Result<()> {
    let lines: String = outputs
        .iter()
        .map(|(name, value)| format!("{name}={value}\n"))
        .collect();

    match optional(&ProcessEnv, GITHUB_OUTPUT) {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("could not open output file {path}"))?;
            file.write_all(lines.as_bytes())
                .with_context(|| format!("could not write output file {path}"))?;
        }
        None => print!("{lines}"),
    }
    Ok(())
}
