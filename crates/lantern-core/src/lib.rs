// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::fs::File;
use std::io;
use std::path::Path;

/// Target for engine lifecycle messages (instance, device, chain, pipeline).
pub const LOG_GENERAL: &str = "lantern::general";
/// Target for messages forwarded from the Vulkan validation layers.
pub const LOG_VULKAN: &str = "lantern::vulkan";

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global fmt subscriber. Filtering follows `RUST_LOG`, so the two
/// targets above can be tuned independently, e.g. `RUST_LOG=info,lantern::vulkan=warn`.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    let _ = fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .compact()
        .try_init();
}

/// Like [`init_tracing`], but also mirrors every event into `log_file`
/// (truncated, no ANSI colors). Only fails if the file cannot be created.
pub fn init_tracing_with_file(log_file: &Path) -> io::Result<()> {
    use tracing_subscriber::{fmt, prelude::*};

    let file = File::create(log_file)?;
    let stdout_log = fmt::layer().with_target(true).compact();
    let file_log = fmt::layer().with_writer(file).with_ansi(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_log)
        .with(file_log)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::info!(target: LOG_GENERAL, "still alive");
    }

    #[test]
    fn file_sink_creates_the_file() {
        let path = std::env::temp_dir().join(format!("lantern-log-{}.log", std::process::id()));
        init_tracing_with_file(&path).unwrap();
        assert!(path.exists());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unwritable_log_path_is_reported() {
        let path = Path::new("/nonexistent-dir/lantern.log");
        assert!(init_tracing_with_file(path).is_err());
    }

    #[test]
    fn targets_share_the_crate_prefix() {
        assert!(LOG_GENERAL.starts_with("lantern::"));
        assert!(LOG_VULKAN.starts_with("lantern::"));
        assert_ne!(LOG_GENERAL, LOG_VULKAN);
    }
}
