/*
 * Copyright 2020 Oxide Computer Company
 */

use crate::common::*;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

/**
 * The document formats understood for catalogs and partition plans, chosen
 * by file extension.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Json,
    Toml,
    Yaml,
}

impl DocFormat {
    pub fn from_path(p: &Path) -> Result<DocFormat> {
        let ext = p
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        Ok(match ext.as_deref() {
            Some("json") => DocFormat::Json,
            Some("toml") => DocFormat::Toml,
            Some("yaml") | Some("yml") => DocFormat::Yaml,
            _ => bail!("{}: unknown document type (want .json, .toml or \
                .yaml)", p.display()),
        })
    }

    pub fn parse<T>(&self, s: &str) -> Result<T>
    where
        for<'de> T: Deserialize<'de>,
    {
        Ok(match self {
            DocFormat::Json => serde_json::from_str(s)?,
            DocFormat::Toml => toml::from_str(s)?,
            DocFormat::Yaml => serde_yaml::from_str(s)?,
        })
    }

    pub fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(match self {
            DocFormat::Json => {
                let mut s = serde_json::to_string_pretty(value)?;
                s.push('\n');
                s
            }
            DocFormat::Toml => toml::to_string(value)?,
            DocFormat::Yaml => serde_yaml::to_string(value)?,
        })
    }
}

pub fn read_file(p: &Path) -> Result<Option<String>> {
    let f = match File::open(p) {
        Ok(f) => f,
        Err(e) => {
            match e.kind() {
                std::io::ErrorKind::NotFound => return Ok(None),
                _ => bail!("open \"{}\": {}", p.display(), e),
            };
        }
    };
    let mut r = std::io::BufReader::new(f);
    let mut out = String::new();
    r.read_to_string(&mut out)?;
    Ok(Some(out))
}

/**
 * Replace the contents of a file.  The data is written to a temporary file in
 * the same directory first and then renamed into place, so a reader never
 * sees a partially written catalog.
 */
pub fn write_file(p: &Path, data: &str) -> Result<()> {
    let dir = match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };

    let tf = tempfile::NamedTempFile::new_in(dir)?;
    let mut w = std::io::BufWriter::new(tf.as_file());
    w.write_all(data.as_bytes())?;
    w.flush()?;
    drop(w);

    tf.persist(p)
        .with_context(|| format!("replacing \"{}\"", p.display()))?;
    Ok(())
}

pub fn read_document<T>(p: &Path) -> Result<Option<T>>
where
    for<'de> T: Deserialize<'de>,
{
    let fmt = DocFormat::from_path(p)?;
    match read_file(p)? {
        None => Ok(None),
        Some(s) => Ok(Some(
            fmt.parse(&s)
                .with_context(|| format!("parsing \"{}\"", p.display()))?,
        )),
    }
}

pub fn write_document<T: Serialize>(
    log: &Logger,
    p: &Path,
    value: &T,
) -> Result<()> {
    let data = DocFormat::from_path(p)?.render(value)?;
    info!(log, "----- WRITE FILE: {} -----", p.display());
    write_file(p, &data)
}
