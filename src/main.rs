use std::collections::BTreeSet;

use clap::Parser;
use folio::{
    ConfigDb,
    DataDir,
    cli::{self, Cli, Command, ConfigAction},
    config::{self, HighlightConfig},
    error::{self, Error},
    highlight::{Highlighter, Query},
    incremental,
    index::{OcrIndex, fields},
    ingestion,
    report,
    walker,
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("FOLIO_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match cli.command {
        Command::Index(args) => {
            let index = OcrIndex::open(&data_dir.index_dir()?)?;
            cmd_index(&index, &config_db, &args)?;
        }
        Command::Remove { name } => {
            let index = OcrIndex::open(&data_dir.index_dir()?)?;
            if !ingestion::remove_document(&index, &config_db, &name)? {
                return Err(Error::NotFound {
                    kind: "document",
                    name,
                });
            }
            println!("Removed '{name}'");
        }
        Command::Highlight(args) => {
            let index = OcrIndex::open(&data_dir.index_dir()?)?;
            cmd_highlight(&index, &config_db, &args)?;
        }
        Command::Status(args) => {
            let index = OcrIndex::open(&data_dir.index_dir()?)?;
            cmd_status(&index, &config_db, &data_dir, args.json)?;
        }
        Command::Config { action } => cmd_config(&config_db, action)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_index(
    index: &OcrIndex,
    config_db: &ConfigDb,
    args: &cli::IndexArgs,
) -> error::Result<()> {
    if !args.dir.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            args.dir.display()
        )));
    }
    let include = walker::build_glob_set(&args.include)?;
    let report = ingestion::update_directory(
        index,
        config_db,
        &args.dir,
        include.as_ref(),
        args.force,
    )?;
    println!(
        "Indexed {} document(s), {} unchanged, {} failed, {} removed",
        report.indexed, report.unchanged, report.failed, report.removed
    );
    Ok(())
}

fn cmd_highlight(
    index: &OcrIndex,
    config_db: &ConfigDb,
    args: &cli::HighlightArgs,
) -> error::Result<()> {
    let mut config = HighlightConfig::from_config_db(config_db)?;
    if let Some(max_branches) = args.max_branches {
        config.max_branches = max_branches;
    }
    if let Some(max_slop) = args.max_slop {
        config.max_slop = max_slop;
    }

    let query = if args.json_query {
        serde_json::from_str::<Query>(&args.query)?
    } else {
        let default_field = args
            .fields
            .first()
            .or(config.fields.first())
            .map_or(fields::TEXT, String::as_str);
        Query::parse(&args.query, default_field)
    };
    tracing::debug!(?query, "parsed query");

    let snapshot = index.snapshot()?;
    let candidates: BTreeSet<_> = if args.all_docs {
        snapshot.live_doc_ids()
    } else if args.docs.is_empty() {
        return Err(Error::Config(
            "name documents with --doc or pass --all-docs".into(),
        ));
    } else {
        let mut ids = BTreeSet::new();
        for name in &args.docs {
            match snapshot.resolve_name(name)? {
                Some(id) => {
                    ids.insert(id);
                }
                None => tracing::warn!(%name, "document not indexed"),
            }
        }
        ids
    };

    let sets = Highlighter::new(&snapshot, &config).highlight(
        &query,
        &candidates,
        &args.fields,
    )?;
    let docs = report::collect(&snapshot, &sets)?;

    if args.json {
        println!("{}", report::format_json(&docs)?);
    } else {
        print!("{}", report::format_human(&docs));
    }
    Ok(())
}

fn cmd_status(
    index: &OcrIndex,
    config_db: &ConfigDb,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let snapshot = index.snapshot()?;
    let metadata = incremental::list_metadata(config_db)?;
    let pages: usize = metadata.iter().map(|(_, m)| m.pages).sum();
    let words: usize = metadata.iter().map(|(_, m)| m.words).sum();

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root(),
            "documents": snapshot.num_docs(),
            "segments": snapshot.num_segments(),
            "pages": pages,
            "words": words,
        });
        println!("{status}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Documents: {}", snapshot.num_docs());
        println!("Segments: {}", snapshot.num_segments());
        println!("Pages: {pages}");
        println!("Words: {words}");
    }
    Ok(())
}

fn cmd_config(config_db: &ConfigDb, action: ConfigAction) -> error::Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config::validate_setting(&key, &value)?;
            config_db.set_setting(&key, &value)?;
            println!("{key} = {value}");
        }
        ConfigAction::Get { key } => match config_db.get_setting(&key)? {
            Some(value) => println!("{value}"),
            None => {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
        },
        ConfigAction::Unset { key } => {
            if !config_db.remove_setting(&key)? {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
            println!("Unset {key}");
        }
        ConfigAction::List { json } => {
            let settings = config_db.list_settings()?;
            if json {
                let map: serde_json::Map<_, _> = settings
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!("{}", serde_json::Value::Object(map));
            } else if settings.is_empty() {
                println!("No settings stored.");
            } else {
                for (key, value) in &settings {
                    println!("{key} = {value}");
                }
            }
        }
    }
    Ok(())
}
