//! Config command implementation.

use std::path::Path;

use anyhow::{Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::format::write_output;

pub fn cmd_config(
    action: &ConfigAction,
    explicit: Option<&Path>,
    config: &Config,
    output: Option<&Path>,
) -> Result<()> {
    let path = Config::resolve_path(explicit);
    match action {
        ConfigAction::Path => write_output(output, &format!("{}\n", path.display())),
        ConfigAction::Show => write_output(output, &config.to_toml()?),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save_to(&path)?;
            eprintln!("Wrote {}", path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let init = ConfigAction::Init { force: false };

        cmd_config(&init, Some(&path), &Config::default(), None).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        assert!(cmd_config(&init, Some(&path), &Config::default(), None).is_err());
        cmd_config(
            &ConfigAction::Init { force: true },
            Some(&path),
            &Config::default(),
            None,
        )
        .unwrap();
    }
}
