//! Airscope CLI - formula inspection for Airtable schemas

use airscope::prelude::*;
use airscope::{parse_formula, FormulaPrinter, Traversal};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "airscope")]
#[command(author, version, about = "Airtable schema formula analyzer")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a formula and print it back, or dump its AST
    Parse {
        /// Formula text
        formula: String,

        /// Output layout
        #[arg(short, long, value_enum, default_value = "compact")]
        style: Style,

        /// Print the AST as JSON instead
        #[arg(long)]
        ast: bool,
    },

    /// Show a table's dependency graph, or one field's neighborhood
    Graph {
        /// Schema JSON file
        schema: PathBuf,

        /// Table ID or name
        table: String,

        /// Field ID or name to traverse from
        #[arg(short, long)]
        field: Option<String>,

        /// Traverse to dependents instead of dependencies
        #[arg(short, long, requires = "field")]
        downstream: bool,

        /// Maximum hops from the field
        #[arg(long)]
        max_depth: Option<usize>,

        /// Maximum fields returned
        #[arg(long)]
        max_nodes: Option<usize>,
    },

    /// Inline referenced formulas into one field's formula
    Compress {
        /// Schema JSON file
        schema: PathBuf,

        /// Table ID or name
        table: String,

        /// Field ID or name
        field: String,

        /// Inlining levels (default: fully)
        #[arg(short, long)]
        depth: Option<usize>,

        /// Output layout
        #[arg(short, long, value_enum, default_value = "compact")]
        style: Style,

        /// Render remaining references as field IDs
        #[arg(long)]
        ids: bool,
    },

    /// Generate a Python evaluator for a table
    Generate {
        /// Schema JSON file
        schema: PathBuf,

        /// Table ID or name
        table: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Data access mode of the generated functions
        #[arg(short, long, value_enum, default_value = "mapping")]
        access: Access,

        /// Omit the module docstring
        #[arg(long)]
        no_header: bool,
    },

    /// Report depth, cycles, complexity and unused fields
    Analyze {
        /// Schema JSON file
        schema: PathBuf,

        /// Only this table (ID or name)
        #[arg(short, long)]
        table: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Style {
    Compact,
    Logical,
}

impl From<Style> for FormatStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Compact => FormatStyle::Compact,
            Style::Logical => FormatStyle::Logical,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Access {
    Mapping,
    Record,
}

impl From<Access> for DataAccess {
    fn from(access: Access) -> Self {
        match access {
            Access::Mapping => DataAccess::Mapping,
            Access::Record => DataAccess::Record,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Parse {
            formula,
            style,
            ast,
        } => parse(&formula, style.into(), ast),
        Commands::Graph {
            schema,
            table,
            field,
            downstream,
            max_depth,
            max_nodes,
        } => {
            let options = TraversalOptions {
                max_depth,
                max_nodes,
            };
            graph(&schema, &table, field.as_deref(), downstream, &options)
        }
        Commands::Compress {
            schema,
            table,
            field,
            depth,
            style,
            ids,
        } => {
            let options = CompressOptions::default()
                .with_depth(depth)
                .with_style(style.into())
                .with_naming(if ids {
                    FieldNaming::Ids
                } else {
                    FieldNaming::Names
                });
            compress(&schema, &table, &field, &options)
        }
        Commands::Generate {
            schema,
            table,
            output,
            access,
            no_header,
        } => {
            let options = GenerateOptions::default()
                .with_data_access(access.into())
                .with_header(!no_header);
            generate(&schema, &table, output.as_deref(), &options)
        }
        Commands::Analyze { schema, table } => analyze(&schema, table.as_deref()),
    }
}

/// Log to stderr; `AIRSCOPE_LOG` overrides the `-v` level
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("AIRSCOPE_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Schema> {
    let schema =
        Schema::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    info!(
        path = %path.display(),
        tables = schema.tables.len(),
        fields = schema.field_count(),
        "loaded schema"
    );
    Ok(schema)
}

fn parse(formula: &str, style: FormatStyle, ast: bool) -> Result<()> {
    let expr = parse_formula(formula).context("Failed to parse formula")?;
    if ast {
        println!("{}", serde_json::to_string_pretty(&expr)?);
    } else {
        println!("{}", FormulaPrinter::new(style).print(&expr));
    }
    Ok(())
}

fn graph(
    path: &Path,
    table: &str,
    field: Option<&str>,
    downstream: bool,
    options: &TraversalOptions,
) -> Result<()> {
    let schema = load(path)?;
    let graph = schema
        .dependency_graph(table)
        .with_context(|| format!("Failed to build graph for '{}'", table))?;
    let analyzer = GraphAnalyzer::new(&graph);

    let Some(field) = field else {
        println!("{} fields, {} edges", graph.len(), graph.edge_count());
        if let Some(cycle) = analyzer.detect_cycle() {
            let path: Vec<&str> = cycle.iter().map(FieldId::as_str).collect();
            println!("cycle: {}", path.join(" -> "));
        }
        for node in graph.table_nodes() {
            let depth = match analyzer.depth(node.id.as_str()) {
                Ok(depth) => depth.to_string(),
                Err(_) => "cyclic".to_string(),
            };
            println!("{}\t{}\t{}\tdepth {}", node.id, node.name, node.field_type, depth);
        }
        for (reader, read) in graph.edges() {
            println!("{} -> {}", reader, read);
        }
        return Ok(());
    };

    let id = schema
        .find_table(table)?
        .find_field(field)
        .map(|f| f.id.clone())
        .with_context(|| format!("Field '{}' not found", field))?;
    let traversal = if downstream {
        analyzer.descendants(id.as_str(), options)?
    } else {
        analyzer.ancestors(id.as_str(), options)?
    };
    print_traversal(&graph, &traversal);
    Ok(())
}

fn print_traversal(graph: &DependencyGraph, traversal: &Traversal) {
    for reached in &traversal.nodes {
        let name = graph
            .node(reached.field_id.as_str())
            .map(|n| n.name.as_str())
            .unwrap_or("?");
        println!("{}\t{}\t{}", reached.distance, reached.field_id, name);
    }
    if traversal.truncated {
        eprintln!("Warning: traversal stopped at a bound");
    }
}

fn compress(path: &Path, table: &str, field: &str, options: &CompressOptions) -> Result<()> {
    let schema = load(path)?;
    let compressed = schema
        .compress_field(table, field, options)
        .with_context(|| format!("Failed to compress '{}'", field))?;
    println!("{}", compressed.text);
    eprintln!(
        "Inlined {} fields ({} -> {} chars)",
        compressed.inlined.len(),
        compressed.original_length,
        compressed.text.len()
    );
    Ok(())
}

fn generate(
    path: &Path,
    table: &str,
    output: Option<&Path>,
    options: &GenerateOptions,
) -> Result<()> {
    let schema = load(path)?;
    let source = schema
        .generate(table, options)
        .with_context(|| format!("Failed to generate evaluator for '{}'", table))?;

    if let Some(output_path) = output {
        std::fs::write(output_path, &source)
            .with_context(|| format!("Failed to write '{}'", output_path.display()))?;
        eprintln!("Wrote '{}'", output_path.display());
    } else {
        io::stdout()
            .write_all(source.as_bytes())
            .context("Failed to write to stdout")?;
    }
    Ok(())
}

fn analyze(path: &Path, table: Option<&str>) -> Result<()> {
    let schema = load(path)?;
    let json = match table {
        Some(table) => {
            let report = schema
                .analyze_table(table)
                .with_context(|| format!("Failed to analyze '{}'", table))?;
            serde_json::to_string_pretty(&report)?
        }
        None => schema.analyze().context("Failed to analyze schema")?.to_json()?,
    };
    println!("{}", json);
    Ok(())
}
