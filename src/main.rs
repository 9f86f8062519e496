/*
 * Copyright 2023 Oxide Computer Company
 */

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

mod catalog;
mod common;
mod config;
mod error;
mod file;
mod partition;
mod reconcile;
mod units;
use common::*;

use catalog::{DiskCatalog, DiskTarget};
use config::{Config, OutputFormat};
use file::{read_document, write_document, DocFormat};
use partition::PartitionTable;

#[derive(Parser)]
#[command(name = "diskparts", version, about)]
struct Args {
    /// Configuration file (default: /etc/diskparts.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log partition table dumps and other debug output
    #[arg(short = 'v', long = "debug", global = true)]
    debug: bool,

    /// Output format; overrides the configuration file
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the disks in a catalog
    Disks { catalog: PathBuf },
    /// Print the partition table discovered on a disk
    Show { catalog: PathBuf, disk: String },
    /// Validate a proposed partition table and print the corrected table
    Reconcile { catalog: PathBuf, plan: PathBuf },
    /// Reconcile a proposed partition table and commit it to the catalog
    Commit {
        catalog: PathBuf,
        plan: PathBuf,
        /// Write the updated catalog here rather than replacing the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct DiskSummary {
    name: String,
    size_mb: u64,
    cylinder_mb: u64,
    boot_disk: bool,
    removable: bool,
    committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solaris_slot: Option<usize>,
}

impl DiskSummary {
    fn new(d: &DiskTarget, cat: &DiskCatalog) -> Self {
        DiskSummary {
            name: d.name.clone(),
            size_mb: d.geometry.size_mb(),
            cylinder_mb: d.geometry.cylinder_mb(),
            boot_disk: d.boot_disk,
            removable: d.removable,
            committed: cat.committed().map_or(false, |c| c.name == d.name),
            vendor: d.vendor.clone(),
            solaris_slot: d.partitions.as_ref().and_then(|t| t.solaris_slot()),
        }
    }
}

/*
 * TOML documents need a table at the root, so the disk list is wrapped.
 */
#[derive(Serialize)]
struct DiskList {
    disks: Vec<DiskSummary>,
}

impl DiskList {
    fn table(&self) -> String {
        let mut out = format!(
            "{:<16} {:>10} {:>8} {:>5} {:>9} {:>7} {:>9}\n",
            "NAME", "SIZE(MB)", "CYL(MB)", "BOOT", "REMOVABLE", "SOLARIS",
            "COMMITTED"
        );
        for d in self.disks.iter() {
            out.push_str(&format!(
                "{:<16} {:>10} {:>8} {:>5} {:>9} {:>7} {:>9}\n",
                d.name,
                d.size_mb,
                d.cylinder_mb,
                if d.boot_disk { "yes" } else { "no" },
                if d.removable { "yes" } else { "no" },
                d.solaris_slot.map(|i| i.to_string()).unwrap_or("-".into()),
                if d.committed { "yes" } else { "no" },
            ));
        }
        out
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, table: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    let out = match format {
        OutputFormat::Json => DocFormat::Json.render(value)?,
        OutputFormat::Toml => DocFormat::Toml.render(value)?,
        OutputFormat::Yaml => DocFormat::Yaml.render(value)?,
        OutputFormat::Table => table(value),
    };
    print!("{}", out);
    Ok(())
}

fn emit_table(format: OutputFormat, t: &PartitionTable) -> Result<()> {
    emit(format, t, |t| t.to_string())
}

fn load_catalog(p: &Path) -> Result<DiskCatalog> {
    match read_document(p)? {
        Some(c) => Ok(c),
        None => bail!("catalog \"{}\" not found", p.display()),
    }
}

fn load_plan(p: &Path) -> Result<PartitionTable> {
    match read_document(p)? {
        Some(t) => Ok(t),
        None => bail!("partition plan \"{}\" not found", p.display()),
    }
}

fn main() {
    let args = Args::parse();

    let config = match config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(init_log(), "fatal error: {:?}", e);
            std::process::exit(1);
        }
    };

    let level = if args.debug {
        Level::Debug
    } else {
        config.log.level().unwrap_or(Level::Info)
    };
    let log = init_log_level(level);

    match run(&log, &args, &config) {
        Ok(()) => {
            info!(log, "ok, run complete");
            std::process::exit(0);
        }
        Err(e) => {
            error!(log, "fatal error: {:?}", e);
            std::process::exit(1);
        }
    }
}

fn run(log: &Logger, args: &Args, config: &Config) -> Result<()> {
    let format = args.format.unwrap_or(config.output.format);

    match &args.command {
        Cmd::Disks { catalog } => {
            let cat = load_catalog(catalog)?;
            let list = DiskList {
                disks: cat
                    .disks
                    .iter()
                    .map(|d| DiskSummary::new(d, &cat))
                    .collect(),
            };
            info!(log, "{} disks in catalog", list.disks.len());
            emit(format, &list, DiskList::table)
        }
        Cmd::Show { catalog, disk } => {
            let cat = load_catalog(catalog)?;
            let t = cat
                .partition_info(disk)
                .with_context(|| format!("partition info for {}", disk))?;
            debug_lines(log, "discovered partition table:", &t.dump());
            emit_table(format, &t)
        }
        Cmd::Reconcile { catalog, plan } => {
            let cat = load_catalog(catalog)?;
            let proposed = load_plan(plan)?;
            let t = cat
                .validate_and_resize(log, &proposed)
                .context("partition plan rejected")?;
            emit_table(format, &t)
        }
        Cmd::Commit { catalog, plan, output } => {
            let mut cat = load_catalog(catalog)?;
            let proposed = load_plan(plan)?;
            let t = cat
                .validate_and_resize(log, &proposed)
                .context("partition plan rejected")?;
            cat.commit(log, t.clone())?;

            let dest = output.as_deref().unwrap_or(catalog.as_path());
            write_document(log, dest, &cat)?;
            info!(log, "committed partition table for {}", t.disk_name);
            emit_table(format, &t)
        }
    }
}
