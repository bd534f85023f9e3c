//! Inspect command - list the contents of a cache file

use crate::cache::{recipe_digest, records, Kwargs, CTIME};
use crate::cli::args::{InspectArgs, OutputFormat};
use crate::error::CacheResult;
use crate::store::{EntryKind, StoreUnit};
use crate::value::Value;
use chrono::{DateTime, Utc};
use console::style;
use std::collections::BTreeSet;

const PREVIEW_WIDTH: usize = 48;

/// Fingerprint records of a unit written by a cache
struct Fingerprint {
    function: String,
    names: BTreeSet<String>,
    args: Vec<serde_json::Value>,
    kwargs: Kwargs,
}

impl Fingerprint {
    fn read(unit: &StoreUnit) -> Option<Self> {
        Some(Self {
            function: unit.load_record(records::FUNCTION).ok()?,
            names: unit.load_record(records::NAMES).ok()?,
            args: unit.load_record(records::ARGS).ok()?,
            kwargs: unit.load_record(records::KWARGS).ok()?,
        })
    }
}

struct EntryRow {
    name: String,
    kind: EntryKind,
    summary: String,
}

/// Execute the inspect command
pub fn execute(args: InspectArgs) -> CacheResult<()> {
    let unit = StoreUnit::open(&args.file)?;
    let fingerprint = Fingerprint::read(&unit);
    let ctime = unit
        .load(CTIME)
        .and_then(|v| v.decode::<DateTime<Utc>>())
        .ok();

    let rows = unit
        .entries()
        .filter(|(name, _)| !records::ALL.contains(name))
        .map(|(name, kind)| -> CacheResult<EntryRow> {
            Ok(EntryRow {
                name: name.to_string(),
                kind,
                summary: summarize(&unit.load(name)?),
            })
        })
        .collect::<CacheResult<Vec<_>>>()?;

    match args.format {
        OutputFormat::Table => print_table(&unit, fingerprint.as_ref(), ctime, &rows)?,
        OutputFormat::Json => print_json(&unit, fingerprint.as_ref(), ctime, &rows)?,
        OutputFormat::Plain => print_plain(&rows),
    }

    Ok(())
}

/// One-line description of a stored value
fn summarize(value: &Value) -> String {
    match value {
        Value::Table(t) => format!("{} rows x {} columns", t.n_rows(), t.n_columns()),
        Value::Histogram(h) => format!("{} bins, {} entries", h.nbins(), h.entries()),
        Value::Object(v) => {
            let text = v.to_string();
            if text.chars().count() > PREVIEW_WIDTH {
                let cut: String = text.chars().take(PREVIEW_WIDTH - 3).collect();
                format!("{cut}...")
            } else {
                text
            }
        }
    }
}

fn print_table(
    unit: &StoreUnit,
    fingerprint: Option<&Fingerprint>,
    ctime: Option<DateTime<Utc>>,
    rows: &[EntryRow],
) -> CacheResult<()> {
    println!("{} {}", style("File:").bold(), unit.path().display());
    match fingerprint {
        Some(fp) => {
            let digest = recipe_digest(&fp.names, &fp.function, &fp.args, &fp.kwargs)?;
            println!("{} {}", style("Function:").bold(), fp.function);
            println!(
                "{} {}",
                style("Args:").bold(),
                serde_json::to_string(&fp.args)?
            );
            println!(
                "{} {}",
                style("Kwargs:").bold(),
                serde_json::to_string(&fp.kwargs)?
            );
            println!("{} {}", style("Recipe:").bold(), style(digest).cyan());
        }
        None => println!("{}", style("No fingerprint records").dim()),
    }
    if let Some(ctime) = ctime {
        println!(
            "{} {}",
            style("Created:").bold(),
            ctime.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();

    println!("{:<24} {:<10} {:<50}", "NAME", "KIND", "VALUE");
    println!("{}", "-".repeat(84));

    for row in rows {
        let kind = match row.kind {
            EntryKind::Table => style(row.kind.as_str()).green().to_string(),
            EntryKind::Histogram => style(row.kind.as_str()).yellow().to_string(),
            EntryKind::Pickled => style(row.kind.as_str()).dim().to_string(),
        };
        println!("{:<24} {:<10} {:<50}", row.name, kind, row.summary);
    }

    println!();
    println!("Total: {} value(s)", rows.len());
    Ok(())
}

fn print_json(
    unit: &StoreUnit,
    fingerprint: Option<&Fingerprint>,
    ctime: Option<DateTime<Utc>>,
    rows: &[EntryRow],
) -> CacheResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        name: &'a str,
        kind: &'static str,
        summary: &'a str,
    }

    #[derive(serde::Serialize)]
    struct UnitJson<'a> {
        path: String,
        function: Option<&'a str>,
        args: Option<&'a [serde_json::Value]>,
        kwargs: Option<&'a Kwargs>,
        recipe: Option<String>,
        created_at: Option<String>,
        entries: Vec<EntryJson<'a>>,
    }

    let recipe = fingerprint
        .map(|fp| recipe_digest(&fp.names, &fp.function, &fp.args, &fp.kwargs))
        .transpose()?;

    let json = UnitJson {
        path: unit.path().display().to_string(),
        function: fingerprint.map(|fp| fp.function.as_str()),
        args: fingerprint.map(|fp| fp.args.as_slice()),
        kwargs: fingerprint.map(|fp| &fp.kwargs),
        recipe,
        created_at: ctime.map(|c| c.to_rfc3339()),
        entries: rows
            .iter()
            .map(|r| EntryJson {
                name: &r.name,
                kind: r.kind.as_str(),
                summary: &r.summary,
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_plain(rows: &[EntryRow]) {
    for row in rows {
        println!("{}", row.name);
    }
}
