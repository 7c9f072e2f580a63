mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::Level;

use argos_magic::entries::MatchConfig;
use argos_magic::strength::strength;
use argos_magic::{ContentInfo, MagicEntries, MagicEntry, MagicMatcher};
use cli::{Cli, Commands};

#[derive(Serialize)]
struct Report {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<ContentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        Level::TRACE
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Identify {
            rules,
            json,
            read_limit,
            max_indirections,
            paths,
        } => {
            let entries = open_rules(rules.as_deref())?
                .with_config(MatchConfig { max_indirections });
            run_identify(&entries, &paths, read_limit, json)
        }
        Commands::Dump { rules } => {
            let entries = open_rules(rules.as_deref())?;
            run_dump(&entries);
            Ok(())
        }
        Commands::Export { output } => {
            let entries = MagicEntries::default_images().context("Failed to build built-in rules")?;
            entries
                .save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} rules to {}", entries.len(), output.display());
            Ok(())
        }
    }
}

fn open_rules(path: Option<&Path>) -> Result<MagicEntries> {
    match path {
        Some(path) => MagicEntries::load(path)
            .with_context(|| format!("Failed to load ruleset {}", path.display())),
        None => MagicEntries::default_images().context("Failed to build built-in rules"),
    }
}

fn probe(entries: &MagicEntries, path: &Path, read_limit: usize) -> Result<Option<ContentInfo>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut data = Vec::new();
    file.take(read_limit as u64)
        .read_to_end(&mut data)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(entries.find_match(&data))
}

fn run_identify(entries: &MagicEntries, paths: &[PathBuf], read_limit: usize, json: bool) -> Result<()> {
    let reports: Vec<Report> = paths
        .par_iter()
        .map(|path| {
            let (content, error) = match probe(entries, path, read_limit) {
                Ok(content) => (content, None),
                Err(e) => (None, Some(format!("{:#}", e))),
            };
            Report {
                path: path.display().to_string(),
                content,
                error,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        match (&report.content, &report.error) {
            (_, Some(error)) => println!("{}: ERROR: {}", report.path, error),
            (Some(info), None) => {
                let message = if info.message.is_empty() {
                    info.name.as_deref().unwrap_or("data")
                } else {
                    info.message.as_str()
                };
                match &info.mime_type {
                    Some(mime) => println!("{}: {} [{}]", report.path, message, mime),
                    None => println!("{}: {}", report.path, message),
                }
            }
            (None, None) => println!("{}: data", report.path),
        }
    }
    Ok(())
}

fn run_dump(entries: &MagicEntries) {
    let mut names: Vec<_> = entries.names().iter().collect();
    names.sort_by(|a, b| a.0.cmp(b.0));
    for (_, entry) in names {
        dump_entry(entry, 0);
    }
    for entry in entries.entries() {
        println!("# strength {}", strength(entry));
        dump_entry(entry, 0);
    }
}

fn dump_entry(entry: &MagicEntry, level: usize) {
    let mut line = ">".repeat(level);
    if entry.is_relative() {
        line.push('&');
    }
    match entry.offset_info() {
        Some(info) => {
            let relative = if info.is_relative() { "&" } else { "" };
            let kind = if info.is_id3() { "I" } else { "" };
            line.push_str(&format!(
                "({}{}.{}{}{:+})",
                relative,
                info.offset(),
                info.size(),
                kind,
                info.add()
            ));
        }
        None => line.push_str(&entry.offset().to_string()),
    }
    line.push('\t');
    line.push_str(entry.matcher().type_name());
    line.push('\t');
    line.push_str(&describe(entry.matcher()));
    if let Some(formatter) = entry.formatter() {
        line.push('\t');
        if !entry.has_space_prefix() {
            line.push_str("\\b");
        }
        line.push_str(&formatter.to_string());
    }
    if let Some(mime) = entry.mime_type() {
        line.push_str(&format!("\t!:mime {}", mime));
    }
    println!("{}", line);

    for child in entry.children() {
        dump_entry(child, level + 1);
    }
}

fn describe(matcher: &MagicMatcher) -> String {
    match matcher {
        MagicMatcher::Byte(m)
        | MagicMatcher::Short(m)
        | MagicMatcher::Int(m)
        | MagicMatcher::Long(m)
        | MagicMatcher::Id3Length(m) => {
            let mask = m.and_mask().map(|mask| format!("&{:#x}", mask)).unwrap_or_default();
            match m.comparison() {
                Some(c) => format!("{}{}{:#x}", mask, c.operator, c.operand),
                None => format!("{}x", mask),
            }
        }
        MagicMatcher::Date(m) | MagicMatcher::LongDate(m) => match m.integer().comparison() {
            Some(c) => format!("{}{}", c.operator, c.operand),
            None => "x".to_string(),
        },
        MagicMatcher::Float(m) | MagicMatcher::Double(m) => match m.comparison() {
            Some(c) => format!("{}{}", c.operator, c.operand),
            None => "x".to_string(),
        },
        MagicMatcher::String(m) => format!("{}{}", m.operator(), hex::encode(m.pattern())),
        MagicMatcher::PString(m) => format!("{}{}", m.operator(), hex::encode(m.pattern())),
        MagicMatcher::Search(m) => format!("/{} {}", m.max_offset(), hex::encode(m.pattern())),
        MagicMatcher::Regex(m) => m.pattern().to_string(),
        MagicMatcher::BigEndianString16(m) | MagicMatcher::LittleEndianString16(m) => {
            format!("{}{}", m.operator(), m.pattern())
        }
        MagicMatcher::Name(name) | MagicMatcher::Use(name) => name.clone(),
        MagicMatcher::Default | MagicMatcher::Indirect | MagicMatcher::Unknown => "x".to_string(),
    }
}
