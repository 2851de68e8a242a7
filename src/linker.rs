//! Native linker invocation.
//!
//! The known linkers are probed in order and the first one present on the
//! system is used. Extra flags from the compiler options are appended
//! after the object path.

use std::path::Path;
use std::process::Command;

use anyhow::{ensure, Context};
use once_cell::sync::Lazy;

static KNOWN_LINKERS: Lazy<Vec<&'static str>> = Lazy::new(|| vec!["cc", "gcc", "clang"]);

fn selected_linker() -> Option<&'static str> {
    KNOWN_LINKERS
        .iter()
        .find(|linker| {
            Command::new(linker)
                .arg("--version")
                .output()
                .map(|output| output.status.success())
                .unwrap_or(false)
        })
        .copied()
}

/// Whether at least one known linker binary is resolvable.
pub fn check_available() -> bool {
    selected_linker().is_some()
}

/// Links `object_path` into the executable `output`, passing the
/// configured extra flags through.
pub fn link(object_path: &Path, output: &str, extra_flags: &[String]) -> anyhow::Result<()> {
    let linker = selected_linker().context("no known linker (cc, gcc, clang) is available")?;
    log::debug!("linking {} with {linker}", object_path.display());

    let status = Command::new(linker)
        .arg(object_path)
        .arg("-o")
        .arg(output)
        .args(extra_flags)
        .status()
        .with_context(|| format!("failed to spawn linker '{linker}'"))?;
    ensure!(status.success(), "linker exited with {status}");
    Ok(())
}
