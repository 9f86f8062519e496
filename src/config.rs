/*
 * Copyright 2023 Oxide Computer Company
 */

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::common::*;
use crate::file::read_file;

pub const DEFAULT_CONFIG: &str = "/etc/diskparts.toml";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub log: ConfigLog,
    #[serde(default)]
    pub output: ConfigOutput,
}

#[derive(Debug, Deserialize)]
pub struct ConfigLog {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for ConfigLog {
    fn default() -> Self {
        ConfigLog { level: default_level() }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl ConfigLog {
    pub fn level(&self) -> Result<Level> {
        Level::from_str(&self.level)
            .map_err(|_| anyhow::anyhow!("unknown log level {:?}", self.level))
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfigOutput {
    #[serde(default)]
    pub format: OutputFormat,
}

/**
 * How results are printed on stdout.
 */
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Toml,
    Yaml,
    Table,
}

/**
 * Load the configuration file.  If no path was given, the default file is
 * optional; an explicitly named file must exist.
 */
pub fn load(path: Option<&Path>) -> Result<Config> {
    let (p, required) = match path {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_CONFIG), false),
    };

    let c: Config = match read_file(p)? {
        Some(s) => toml::from_str(&s)
            .with_context(|| format!("parsing \"{}\"", p.display()))?,
        None if required => bail!("config file \"{}\" not found", p.display()),
        None => Config::default(),
    };

    c.log.level()?;
    Ok(c)
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;

    #[test]
    fn config_defaults() -> Result<()> {
        let input = "\n";
        let c: Config = toml::from_str(input)?;
        assert_eq!(c.log.level()?, Level::Info);
        assert_eq!(c.output.format, OutputFormat::Json);
        Ok(())
    }

    #[test]
    fn config_debug_table() -> Result<()> {
        let input = "[log]\nlevel = \"debug\"\n[output]\nformat = \"table\"\n";
        let c: Config = toml::from_str(input)?;
        assert_eq!(c.log.level()?, Level::Debug);
        assert_eq!(c.output.format, OutputFormat::Table);
        Ok(())
    }

    #[test]
    fn config_bad_level() -> Result<()> {
        let c: Config = toml::from_str("[log]\nlevel = \"loud\"\n")?;
        assert!(c.log.level().is_err());
        Ok(())
    }

    #[test]
    fn config_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("diskparts.toml");
        assert!(load(Some(&p)).is_err());

        std::fs::write(&p, "[output]\nformat = \"yaml\"\n")?;
        assert_eq!(load(Some(&p))?.output.format, OutputFormat::Yaml);

        std::fs::write(&p, "[log]\nlevel = \"loud\"\n")?;
        assert!(load(Some(&p)).is_err());
        Ok(())
    }
}
