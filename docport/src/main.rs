//! Legacy database to document model export tool.
//!
//! This binary introspects a relational source, translates its table and
//! column names through an operator-supplied map, and streams every row
//! out as JSON documents, one collection per table. It can also emit a
//! JSON-Schema-shaped descriptor of the translated schema for downstream
//! code generation.

mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use docport_core::catalog::CatalogSource;
use docport_core::logging::init_logging;
use docport_core::sink::DocumentSink;
use docport_core::{
    CancelSignal, Exporter, Introspector, TranslationMap, build_schema_descriptor, cancel_channel,
};
use output::{JsonArrayFileSink, JsonLinesSink};

#[derive(Parser)]
#[command(name = "docport")]
#[command(about = "Export a legacy relational database into a document model")]
#[command(version)]
#[command(long_about = "
docport - legacy database to document model export

Introspects a relational source database, renames tables and columns
through a translation map, and streams rows out as JSON documents.

The translation map is a YAML file of 'Table/Column': 'table/column'
entries. When supplied, it must cover every exported field; a partial
map aborts the export rather than silently keeping legacy names. Without
a map, names pass through unchanged.

EXAMPLES:
  docport --database-url sqlite:///legacy.db tables
  docport --database-url sqlite:///legacy.db columns > skeleton.txt
  docport --database-url sqlite:///legacy.db --translation map.yaml schema
  docport --database-url sqlite:///legacy.db --translation map.yaml export -o out/
  docport --database-url sqlite:///legacy.db export --table customers
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", help = "Source database connection string")]
    database_url: Option<String>,

    /// Translation map YAML file
    #[arg(
        long,
        help = "YAML file of 'Table/Column': 'table/column' entries; omit for passthrough"
    )]
    translation: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List base tables in the source database
    Tables,
    /// List every table/column pair in translation-key form
    Columns,
    /// Build the translated schema descriptor
    Schema(SchemaArgs),
    /// Export rows into document collections
    Export(ExportArgs),
}

#[derive(Args)]
struct SchemaArgs {
    /// Output file path ("-" for stdout)
    #[arg(short, long, default_value = "schema.docport.json")]
    output: PathBuf,
}

#[derive(Args)]
struct ExportArgs {
    /// Output directory for per-collection JSON array files
    #[arg(short, long, default_value = "export")]
    output: PathBuf,

    /// Export a single table, addressed by its translated name
    #[arg(long, help = "Translated table name to export on its own")]
    table: Option<String>,

    /// Output path for --table, one JSON document per line ("-" for stdout)
    #[arg(long, default_value = "-")]
    table_output: PathBuf,

    /// Write into a MongoDB database instead of files
    #[cfg(feature = "mongodb")]
    #[arg(long, help = "MongoDB connection URI")]
    mongodb_uri: Option<String>,

    /// Target MongoDB database name
    #[cfg(feature = "mongodb")]
    #[arg(long, requires = "mongodb_uri")]
    mongodb_database: Option<String>,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let database_url = cli
        .database_url
        .as_deref()
        .context("database URL is required (use --database-url or DATABASE_URL)")?;
    let catalog = connect_catalog(database_url).await?;
    let translation = load_translation(cli.translation.as_deref()).await?;

    match &cli.command {
        Command::Tables => list_tables(&catalog).await,
        Command::Columns => list_columns(&catalog).await,
        Command::Schema(args) => build_schema(&catalog, &translation, args).await,
        Command::Export(args) => run_export(&catalog, &translation, args).await,
    }
}

#[cfg(feature = "sqlite")]
async fn connect_catalog(
    database_url: &str,
) -> anyhow::Result<docport_core::catalog::sqlite::SqliteCatalog> {
    docport_core::catalog::sqlite::SqliteCatalog::connect(database_url)
        .await
        .context("failed to open source database")
}

#[cfg(not(feature = "sqlite"))]
async fn connect_catalog(_database_url: &str) -> anyhow::Result<docport_core::catalog::memory::MemoryCatalog> {
    anyhow::bail!("no catalog backend compiled in; rebuild with --features sqlite")
}

async fn load_translation(path: Option<&std::path::Path>) -> anyhow::Result<TranslationMap> {
    match path {
        Some(path) => {
            let map = TranslationMap::from_yaml_file(path)
                .await
                .with_context(|| format!("failed to load translation map {}", path.display()))?;
            info!("loaded translation map from {}", path.display());
            Ok(map)
        }
        None => {
            info!("no translation map supplied; names pass through unchanged");
            Ok(TranslationMap::passthrough())
        }
    }
}

async fn list_tables(catalog: &dyn CatalogSource) -> anyhow::Result<()> {
    let introspector = Introspector::new(catalog);
    for table in introspector.list_tables().await? {
        println!("{table}");
    }
    Ok(())
}

/// Prints every pair as `Table/Column`, the key format of the translation
/// map, so the output doubles as a map skeleton.
async fn list_columns(catalog: &dyn CatalogSource) -> anyhow::Result<()> {
    let introspector = Introspector::new(catalog);
    for (table, column) in introspector.table_column_pairs().await? {
        println!("{table}/{column}");
    }
    Ok(())
}

async fn build_schema(
    catalog: &dyn CatalogSource,
    translation: &TranslationMap,
    args: &SchemaArgs,
) -> anyhow::Result<()> {
    let introspector = Introspector::new(catalog);

    let mut tables = Vec::new();
    for name in introspector.list_tables().await? {
        tables.push(introspector.describe_columns(&name).await?);
    }

    let descriptor = build_schema_descriptor(&tables, translation)?;
    let json = serde_json::to_string_pretty(&descriptor)
        .context("failed to serialize schema descriptor")?;

    if args.output.as_os_str() == "-" {
        println!("{json}");
    } else {
        tokio::fs::write(&args.output, &json)
            .await
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("schema descriptor written to {}", args.output.display());
        println!("Schema descriptor: {}", args.output.display());
        println!("Tables described: {}", descriptor.len());
    }

    Ok(())
}

async fn run_export(
    catalog: &dyn CatalogSource,
    translation: &TranslationMap,
    args: &ExportArgs,
) -> anyhow::Result<()> {
    let (cancel_tx, cancel_rx) = cancel_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling export");
            let _ = cancel_tx.send(true);
        }
    });

    let exporter = Exporter::new(catalog, translation);

    if let Some(table) = &args.table {
        return export_single_table(&exporter, table, &args.table_output, cancel_rx).await;
    }

    let mut sink = open_database_sink(args).await?;
    let stats = exporter.export_database(sink.as_mut(), Some(cancel_rx)).await?;

    println!("Export completed successfully");
    println!("Tables exported: {}", stats.tables);
    println!("Documents written: {}", stats.documents);
    Ok(())
}

async fn open_database_sink(args: &ExportArgs) -> anyhow::Result<Box<dyn DocumentSink>> {
    #[cfg(feature = "mongodb")]
    if let (Some(uri), Some(database)) = (&args.mongodb_uri, &args.mongodb_database) {
        let sink = docport_core::sink::mongo::MongoSink::connect(uri, database)
            .await
            .context("failed to connect to MongoDB")?;
        info!("exporting into MongoDB database '{}'", database);
        return Ok(Box::new(sink));
    }

    info!("exporting into directory {}", args.output.display());
    Ok(Box::new(JsonArrayFileSink::new(&args.output)))
}

/// Streams one table, addressed by translated name, as JSON Lines.
async fn export_single_table(
    exporter: &Exporter<'_>,
    translated: &str,
    output: &std::path::Path,
    cancel: CancelSignal,
) -> anyhow::Result<()> {
    let mut sink: JsonLinesSink = if output.as_os_str() == "-" {
        JsonLinesSink::stdout()
    } else {
        JsonLinesSink::create(output).await?
    };

    let mut stream = exporter
        .export_table_by_translated_name(translated, Some(cancel))
        .await?;

    let mut documents: u64 = 0;
    while let Some(result) = stream.next().await {
        let document = match result {
            Ok(document) => document,
            Err(e) => {
                discard_partial_output(&mut sink).await;
                return Err(e.into());
            }
        };
        if let Err(e) = sink.insert_document(translated, &document).await {
            discard_partial_output(&mut sink).await;
            return Err(e.into());
        }
        documents += 1;
    }
    sink.commit().await?;

    info!("exported {} documents from '{}'", documents, translated);
    Ok(())
}

/// Asks the sink to discard partial output; an abort failure is logged
/// rather than replacing the export error that led here.
async fn discard_partial_output(sink: &mut dyn DocumentSink) {
    if let Err(e) = sink.abort().await {
        warn!("failed to discard partial output: {}", e);
    }
}
