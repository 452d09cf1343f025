use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use regis_keychain::{FileKeychain, HashmapKeychain, Keychain, KeychainConfig, SectorKey};
use regis_register::{FieldValue, Object, RegisterType, Standard, State};
use regis_types::Uint256;
use serde::Serialize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Keys(args) => cmd_keys(&config, format, args),
        Command::Get(args) => cmd_get(&config, format, args),
        Command::Erase(args) => cmd_toggle(&config, format, args, Toggle::Erase),
        Command::Restore(args) => cmd_toggle(&config, format, args, Toggle::Restore),
        Command::Probe(args) => cmd_probe(&config, format, args),
        Command::Inspect(args) => cmd_inspect(format, args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<KeychainConfig> {
    match path {
        Some(path) => KeychainConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(KeychainConfig::default()),
    }
}

fn emit<T: Serialize>(format: OutputFormat, report: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => text(report),
    }
    Ok(())
}

fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = input.trim().trim_start_matches("0x");
    hex::decode(trimmed).with_context(|| format!("invalid hex: {input}"))
}

fn open_filemap(config: &KeychainConfig, dir: &Path) -> anyhow::Result<FileKeychain> {
    FileKeychain::open(dir, config.filemap.clone())
        .with_context(|| format!("opening file keychain {}", dir.display()))
}

// ---------------------------------------------------------------------------
// Keychain commands
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RecordReport {
    key: String,
    state: String,
    sector_file: u16,
    sector_start: u32,
    sector_size: u32,
}

impl From<&SectorKey> for RecordReport {
    fn from(record: &SectorKey) -> Self {
        Self {
            key: hex::encode(&record.key),
            state: format!("{:?}", record.state),
            sector_file: record.sector_file,
            sector_start: record.sector_start,
            sector_size: record.sector_size,
        }
    }
}

fn print_record(record: &RecordReport) {
    println!(
        "{} {} sector {}:{} ({} bytes)",
        record.key.yellow(),
        record.state.green(),
        record.sector_file,
        record.sector_start,
        record.sector_size
    );
}

#[derive(Debug, Serialize)]
struct KeyEntry {
    key: String,
    file: u32,
    offset: u64,
}

fn keys_report(chain: &FileKeychain) -> anyhow::Result<Vec<KeyEntry>> {
    let mut entries = Vec::new();
    for key in chain.keys()? {
        if let Some(location) = chain.location(&key) {
            entries.push(KeyEntry {
                key: hex::encode(&key),
                file: location.file,
                offset: location.offset,
            });
        }
    }
    Ok(entries)
}

fn cmd_keys(config: &KeychainConfig, format: OutputFormat, args: KeysArgs) -> anyhow::Result<()> {
    let chain = open_filemap(config, &args.dir)?;
    let entries = keys_report(&chain)?;
    emit(format, &entries, |entries| {
        for entry in entries {
            println!("{}  {}:{}", entry.key.yellow(), entry.file, entry.offset);
        }
        println!("{} keys", entries.len().to_string().bold());
    })
}

fn cmd_get(config: &KeychainConfig, format: OutputFormat, args: KeyArgs) -> anyhow::Result<()> {
    let chain = open_filemap(config, &args.dir)?;
    let key = parse_hex(&args.key)?;
    let report = chain.get(&key)?.as_ref().map(RecordReport::from);
    emit(format, &report, |report| match report {
        Some(record) => print_record(record),
        None => println!("{} {}", "not found:".red(), args.key),
    })
}

#[derive(Clone, Copy)]
enum Toggle {
    Erase,
    Restore,
}

#[derive(Debug, Serialize)]
struct ToggleReport {
    key: String,
    action: &'static str,
    changed: bool,
}

fn cmd_toggle(
    config: &KeychainConfig,
    format: OutputFormat,
    args: KeyArgs,
    toggle: Toggle,
) -> anyhow::Result<()> {
    let chain = open_filemap(config, &args.dir)?;
    let key = parse_hex(&args.key)?;
    let (action, changed) = match toggle {
        Toggle::Erase => ("erase", chain.erase(&key)?),
        Toggle::Restore => ("restore", chain.restore(&key)?),
    };
    let report = ToggleReport {
        key: hex::encode(&key),
        action,
        changed,
    };
    emit(format, &report, |report| {
        if report.changed {
            println!("{} {} {}", "✓".green().bold(), report.action, report.key.yellow());
        } else {
            println!("{} {}: no such key", report.action, report.key.yellow());
        }
    })
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    key: String,
    bucket: u32,
    generations: u32,
    versions: Vec<RecordReport>,
}

fn cmd_probe(config: &KeychainConfig, format: OutputFormat, args: KeyArgs) -> anyhow::Result<()> {
    let chain = HashmapKeychain::open(&args.dir, config.hashmap.clone())
        .with_context(|| format!("opening hashmap keychain {}", args.dir.display()))?;
    let key = parse_hex(&args.key)?;
    let bucket = chain.bucket_of(&key);
    let report = ProbeReport {
        key: hex::encode(&key),
        bucket,
        generations: chain.generation_count(bucket),
        versions: chain.get_versions(&key)?.iter().map(RecordReport::from).collect(),
    };
    emit(format, &report, |report| {
        println!(
            "{} bucket {} ({} generations)",
            report.key.yellow(),
            report.bucket,
            report.generations
        );
        if report.versions.is_empty() {
            println!("  {}", "no versions".dimmed());
        }
        for version in &report.versions {
            print!("  ");
            print_record(version);
        }
    })
}

// ---------------------------------------------------------------------------
// Object inspection
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct FieldReport {
    name: String,
    field_type: &'static str,
    mutable: bool,
    value: FieldValue,
}

#[derive(Debug, Serialize)]
struct StateReport {
    register_type: RegisterType,
    owner: Uint256,
    created: u64,
    modified: u64,
    valid: bool,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<StateReport>,
    fields: Vec<FieldReport>,
    standard: Standard,
    base: Standard,
    cost: u64,
}

fn inspect_report(bytes: &[u8], full_state: bool) -> anyhow::Result<InspectReport> {
    let (object, state_report) = if full_state {
        let state = State::from_bytes(bytes).context("decoding register state")?;
        let report = StateReport {
            register_type: state.register_type,
            owner: state.owner,
            created: state.created,
            modified: state.modified,
            valid: state.is_valid(),
        };
        (Object::from_state(state)?, Some(report))
    } else {
        let state = State::new(RegisterType::Object, Uint256::ZERO, bytes.to_vec());
        (Object::from_state(state)?, None)
    };

    let mut fields = Vec::new();
    for (name, value) in object.values()? {
        let slot = object
            .field(&name)
            .with_context(|| format!("field {name} vanished"))?;
        fields.push(FieldReport {
            field_type: slot.field_type.name(),
            mutable: slot.mutable,
            name,
            value,
        });
    }

    Ok(InspectReport {
        state: state_report,
        fields,
        standard: object.standard(),
        base: object.base(),
        cost: object.cost(),
    })
}

fn cmd_inspect(format: OutputFormat, args: InspectArgs) -> anyhow::Result<()> {
    let bytes = parse_hex(&args.hex)?;
    let report = inspect_report(&bytes, args.state)?;
    emit(format, &report, |report| {
        if let Some(state) = &report.state {
            let valid = if state.valid { "valid".green() } else { "INVALID".red() };
            println!("{:?} register owned by {}", state.register_type, state.owner.to_string().cyan());
            println!("  created {} modified {} checksum {}", state.created, state.modified, valid);
        }
        for field in &report.fields {
            let marker = if field.mutable { "mut" } else { "   " };
            println!("  {} {} {:<8} {}", marker.dimmed(), field.name.bold(), field.field_type, field.value);
        }
        println!(
            "standard {:?} (base {:?}), cost {}",
            report.standard, report.base, report.cost
        );
    })
}
