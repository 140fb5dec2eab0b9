mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, RemoveArgs, SearchArgs};
use dotenv::dotenv;
use progress::CliReporter;
use smdb_companion_core::license::Registration;
use smdb_companion_core::{
    Algorithm, AlgorithmEntry, AppConfig, Companion, DetectorConfig, DetectorSet, DualMonoTarget,
    FileRecord, Metadata, RemoveRequest, SearchResults,
};
use tracing::{error, info, warn};

fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let mut config = match smdb_companion_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    if let Some(db) = args.db {
        config.database = Some(db);
    }

    let result = match args.command {
        Some(Commands::Search(search)) => run_search(&config, &search),
        Some(Commands::Scan { folders, search }) => run_scan(&config, folders, &search),
        Some(Commands::Find {
            text,
            column,
            case_sensitive,
            export,
        }) => run_find(&config, &text, &column, case_sensitive, export.as_deref()),
        Some(Commands::Replace {
            find,
            replace,
            column,
            case_sensitive,
            mark_dirty,
            yes,
        }) => run_replace(
            &config,
            Metadata {
                find,
                replace,
                column,
                case_sensitive,
                mark_dirty,
            },
            yes,
        ),
        Some(Commands::Remove(remove)) => run_remove(&config, &remove),
        Some(Commands::Columns) => companion(&config)
            .get_columns()
            .map_err(anyhow::Error::from)
            .map(|columns| {
                for column in columns {
                    println!("{}", column);
                }
            }),
        Some(Commands::Size) => companion(&config)
            .get_db_size()
            .map_err(anyhow::Error::from)
            .map(|size| println!("{} records", format!("{}", size).cyan())),
        Some(Commands::ClearCache) => companion(&config)
            .clear_fingerprints()
            .map_err(anyhow::Error::from)
            .map(|cleared| {
                println!("Cleared cached results of {} records", format!("{}", cleared).cyan())
            }),
        Some(Commands::CheckReg {
            name,
            email,
            license,
        }) => {
            let registration = Registration {
                name,
                email,
                license,
            };
            if companion(&config).check_reg(&registration) {
                println!("{}", "Registration is valid".green());
            } else {
                println!("{}", "Registration is not valid".red());
            }
            Ok(())
        }
        Some(Commands::PrintConfig) => toml::to_string_pretty(&config)
            .context("could not render configuration")
            .map(|text| println!("{}", text)),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
    Ok(())
}

fn companion(config: &AppConfig) -> Companion {
    Companion::from_config(config, Arc::new(CliReporter::new()))
}

/// Detectors from the command line, or the configured ones when none are given.
fn detector_set(config: &AppConfig, args: &SearchArgs) -> Result<DetectorSet> {
    let mut detectors = if args.detectors.is_empty() {
        DetectorSet::new(config.detectors.clone())
    } else {
        let entries: Vec<AlgorithmEntry> = args
            .detectors
            .iter()
            .map(|id| AlgorithmEntry {
                id: id.clone(),
                enabled: true,
                min_dur: args.min_dur,
                db: None,
            })
            .collect();
        DetectorSet::from_entries(&entries)?
    };
    if let Some(compare) = &args.compare {
        detectors = DetectorSet::new(
            detectors
                .configs()
                .iter()
                .cloned()
                .chain(std::iter::once(DetectorConfig::Dbcompare {
                    db: Some(compare.clone()),
                }))
                .collect(),
        );
    }
    if detectors.is_empty() {
        bail!("no detectors enabled");
    }
    Ok(detectors)
}

fn search_database(config: &AppConfig, args: &SearchArgs) -> Result<(Companion, SearchResults)> {
    let companion = companion(config);
    let Some(db) = config.database.clone() else {
        bail!("no database given; pass --db or set `database` in Config.toml");
    };
    let name = companion.open_db(&db, false)?;
    if let Some(compare) = &config.compare_database {
        companion.open_db(compare, true)?;
    }
    info!("Searching {}", name.cyan());
    let detectors = detector_set(config, args)?;
    let results = companion.search_results(detectors, &config.preferences)?;
    Ok((companion, results))
}

fn run_search(config: &AppConfig, args: &SearchArgs) -> Result<()> {
    let (_, results) = search_database(config, args)?;
    report(&results, args, config.preferences.display_all_records)
}

fn run_scan(config: &AppConfig, folders: Vec<PathBuf>, args: &SearchArgs) -> Result<()> {
    let folders = if folders.is_empty() {
        config.folders.iter().map(PathBuf::from).collect()
    } else {
        folders
    };
    if folders.is_empty() {
        bail!("no folders given; pass them as arguments or set `folders` in Config.toml");
    }
    let detectors = detector_set(config, args)?;
    let results =
        companion(config).search_file_system_results(detectors, &config.preferences, folders)?;
    report(&results, args, config.preferences.display_all_records)
}

fn report(results: &SearchResults, args: &SearchArgs, display_all: bool) -> Result<()> {
    let groups = if args.relevant || !display_all {
        results.relevant()
    } else {
        results.groups()
    };
    for (n, group) in groups
        .iter()
        .enumerate()
        .filter(|(_, g)| g.len() > 1 || !g[0].is_pure_keep())
    {
        println!("{}", format!("Group {}", n + 1).bold());
        for record in group {
            print_record(record);
        }
    }
    for error in &results.errors {
        warn!("{}", error);
    }
    info!(
        "{} clusters, {} records to remove, {} errors",
        format!("{}", results.clusters().len()).cyan(),
        format!("{}", results.removal_ids().len()).red(),
        format!("{}", results.errors.len()).yellow(),
    );
    if let Some(path) = &args.export {
        export_csv(path, &groups)?;
        info!("Exported results to {}", path.display());
    }
    Ok(())
}

fn print_record(record: &FileRecord) {
    let tags = record
        .algorithm
        .iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(", ");
    let line = format!(
        "  {:>7}  {:<28}  {}",
        record.id,
        tags,
        record.full_path().display()
    );
    if record.is_kept() {
        println!("{}", line.green());
    } else {
        println!("{}", line.red());
    }
}

fn export_csv(path: &Path, groups: &[Vec<FileRecord>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("could not create {}", path.display()))?;
    writer.write_record([
        "group",
        "id",
        "keep",
        "tags",
        "filename",
        "path",
        "duration",
        "channels",
        "samplerate",
        "bitdepth",
        "description",
    ])?;
    for (n, group) in groups.iter().enumerate() {
        for record in group {
            let tags = record
                .algorithm
                .iter()
                .map(|a| format!("{:?}", a))
                .collect::<Vec<_>>()
                .join("|");
            writer.write_record([
                (n + 1).to_string(),
                record.id.to_string(),
                record.is_kept().to_string(),
                tags,
                record.filename.clone(),
                record.path.clone(),
                record.duration.clone(),
                record.channels.to_string(),
                record.samplerate.to_string(),
                record.bitdepth.to_string(),
                record.description.clone(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn run_find(
    config: &AppConfig,
    text: &str,
    column: &str,
    case_sensitive: bool,
    export: Option<&Path>,
) -> Result<()> {
    let companion = companion(config);
    let Some(db) = config.database.clone() else {
        bail!("no database given; pass --db or set `database` in Config.toml");
    };
    companion.open_db(&db, false)?;
    let records = companion.find_metadata(text, column, case_sensitive, &config.preferences)?;
    for record in &records {
        println!(
            "  {:>7}  {}  {}",
            record.id,
            record.full_path().display(),
            record.value(column).unwrap_or_default()
        );
    }
    info!("{} records match", format!("{}", records.len()).cyan());
    if let Some(path) = export {
        export_csv(path, &[records])?;
    }
    Ok(())
}

fn run_replace(config: &AppConfig, request: Metadata, yes: bool) -> Result<()> {
    let companion = companion(config);
    let Some(db) = config.database.clone() else {
        bail!("no database given; pass --db or set `database` in Config.toml");
    };
    companion.open_db(&db, false)?;
    let matches = companion
        .find_metadata(&request.find, &request.column, request.case_sensitive, &config.preferences)?
        .len();
    if matches == 0 {
        info!("Nothing to replace");
        return Ok(());
    }
    let prompt = format!(
        "Replace '{}' with '{}' in {} of {} records?",
        request.find, request.replace, request.column, matches
    );
    if !yes && !prompt_confirm(&prompt, Some(false))? {
        return Ok(());
    }
    let changed = companion.replace_metadata(&request)?;
    info!("{} records updated", format!("{}", changed).green());
    Ok(())
}

fn run_remove(config: &AppConfig, args: &RemoveArgs) -> Result<()> {
    let (companion, results) = search_database(config, &args.search)?;
    report(&results, &args.search, config.preferences.display_all_records)?;

    let ids = results.removal_ids();
    let dual_mono: Vec<DualMonoTarget> = if args.strip_dual_mono {
        results
            .flat()
            .iter()
            .filter(|r| r.is_kept() && r.has(Algorithm::DualMono))
            .map(|r| DualMonoTarget {
                id: r.id,
                path: r.full_path().to_string_lossy().into_owned(),
            })
            .collect()
    } else {
        Vec::new()
    };
    if ids.is_empty() && dual_mono.is_empty() {
        info!("Nothing to remove");
        return Ok(());
    }

    let mut request = RemoveRequest {
        ids,
        delete: args.files.into(),
        dual_mono,
        strip_dual_mono: args.strip_dual_mono,
        archive_dir: args.archive_dir.clone(),
        ..RemoveRequest::default()
    };
    if let Some(tag) = &args.clone {
        request.clone = true;
        request.clone_tag = tag.clone();
    }

    let prompt = format!(
        "Remove {} records ({:?} files){}?",
        request.ids.len(),
        request.delete,
        if request.clone {
            format!(" from a copy tagged '{}'", request.clone_tag)
        } else {
            String::new()
        }
    );
    if !args.yes && !prompt_confirm(&prompt, Some(false))? {
        return Ok(());
    }

    let outcome = companion.remove_records(&request)?;
    info!(
        "Removed {} records, {} files, {} stripped to mono in {}",
        format!("{}", outcome.removed).red(),
        format!("{}", outcome.files_disposed).red(),
        format!("{}", outcome.stripped).cyan(),
        outcome.db_path.display()
    );
    for failed in &outcome.failed_files {
        warn!("Could not strip {}", failed);
    }
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
