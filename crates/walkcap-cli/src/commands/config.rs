//! Configuration management commands

use anyhow::bail;
use std::path::Path;
use walkcap_core::CaptureConfig;
use walkcap_core::config::save_to_file;

use crate::console::CliConsole;

/// Write a default configuration file
pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    let console = CliConsole::new();
    if path.exists() && !force {
        bail!(
            "configuration file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    save_to_file(&CaptureConfig::default(), path)?;
    console.success(&format!("Wrote default configuration to {}", path.display()));
    Ok(())
}

/// Print the effective configuration as TOML
pub fn show(path: &Path, config: &CaptureConfig) -> anyhow::Result<()> {
    let console = CliConsole::new();
    console.print_header("Configuration");
    if path.exists() {
        console.info(&format!("Loaded from {}", path.display()));
    } else {
        console.warn(&format!("{} not found, showing defaults", path.display()));
    }
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use walkcap_core::config::load_from_file;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("walkcap.toml");
        init(&path, false).unwrap();
        assert_eq!(load_from_file(&path).unwrap(), CaptureConfig::default());
        assert!(init(&path, false).is_err());
        init(&path, true).unwrap();
    }
}
