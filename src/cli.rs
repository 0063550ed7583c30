//! Command-line front end.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::{load_config, AppConfig};
use crate::error::Result;
use crate::graph::query::{generate_where_clause, Predicate, ResultColumn, SearchQuery, WhereClause};
use crate::graph::store::GraphStore;
use crate::graph::traversal::Traversal;
use crate::ingest::{read_json_lines, CallGraphImporter};

/// Call-graph store on SQLite.
#[derive(Parser, Debug)]
#[command(name = "callgraph-db")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, default_value = "callgraph.yaml")]
    pub config: PathBuf,

    /// Database file, overriding the configuration
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and apply the schema
    Init,

    /// Import call records from a JSON Lines file ("-" reads stdin)
    Import {
        file: PathBuf,
    },

    /// Write the whole graph as JSON
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },

    /// Print the body of one node
    Find {
        id: String,
    },

    /// Find nodes whose body field matches a value
    Search {
        /// Body field, e.g. `name` or `pkg.path`
        #[arg(short, long)]
        key: String,

        value: String,

        /// Compare with LIKE instead of equality
        #[arg(long)]
        like: bool,

        /// Print identifiers instead of bodies
        #[arg(long)]
        ids: bool,
    },

    /// Walk the graph from a node, one JSON step per line
    Traverse {
        source: String,

        /// Stop once this node is reached
        #[arg(short, long)]
        target: Option<String>,

        /// Follow edges against their direction
        #[arg(long)]
        inbound: bool,

        /// Follow edges along their direction (default)
        #[arg(long)]
        outbound: bool,

        /// Include node bodies
        #[arg(long)]
        bodies: bool,

        /// Print only the path from source to target
        #[arg(long, requires = "target")]
        path: bool,
    },

    /// Print node and edge counts
    Stats,

    /// Serve the graph over HTTP
    Serve {
        /// Listen address, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },
}

impl Cli {
    /// Configuration with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = load_config(Some(&self.config))?;
        if let Some(path) = &self.database {
            config.store.path = path.clone();
        }
        if let Commands::Serve { bind: Some(bind) } = &self.command {
            config.server.bind = bind.clone();
        }
        Ok(config)
    }
}

/// Execute the parsed command, writing results to `out`.
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    let config = cli.resolve_config()?;
    let store = GraphStore::open(&config.store)?;

    match &cli.command {
        Commands::Init => {
            writeln!(out, "initialized {}", config.store.path.display())?;
        }
        Commands::Import { file } => {
            let mut importer = CallGraphImporter::new(&store);
            if file.as_os_str() == "-" {
                for record in read_json_lines(io::stdin().lock()) {
                    importer.add_record(&record?)?;
                }
            } else {
                for record in read_json_lines(BufReader::new(File::open(file)?)) {
                    importer.add_record(&record?)?;
                }
            }
            let stats = importer.stats();
            tracing::info!(
                "import finished: {} records, {} new nodes, {} new edges",
                stats.records,
                stats.nodes_added,
                stats.edges_added
            );
            writeln!(out, "{}", serde_json::to_string(&stats)?)?;
        }
        Commands::Export { output, pretty } => {
            let graph = store.get_all_data()?;
            match output {
                Some(path) => {
                    let mut writer = BufWriter::new(File::create(path)?);
                    write_json(&mut writer, &graph, *pretty)?;
                    writer.flush()?;
                }
                None => write_json(out, &graph, *pretty)?,
            }
        }
        Commands::Find { id } => {
            writeln!(out, "{}", store.find_node(id)?)?;
        }
        Commands::Search {
            key,
            value,
            like,
            ids,
        } => {
            let predicate = if *like { Predicate::Like } else { Predicate::Eq };
            let clause = generate_where_clause(&WhereClause::key_value(key.as_str()).with_predicate(predicate))?;
            let query = SearchQuery {
                result_column: if *ids { ResultColumn::Id } else { ResultColumn::Body },
                clauses: vec![clause],
                ..SearchQuery::default()
            };
            for row in store.search_nodes(&query, &[value.as_str()])? {
                writeln!(out, "{row}")?;
            }
        }
        Commands::Traverse {
            source,
            target,
            inbound,
            outbound,
            bodies,
            path,
        } => {
            let traversal = match (*inbound, *outbound) {
                (true, true) => Traversal::both(),
                (true, false) => Traversal::inbound(),
                _ => Traversal::outbound(),
            }
            .with_bodies(*bodies);
            let walker = store.traversal();

            if *path {
                // `requires = "target"` guarantees a target here.
                let Some(target) = target else {
                    return Ok(());
                };
                match walker.find_path(source, target, traversal)? {
                    Some(ids) => writeln!(out, "{}", ids.join(" -> "))?,
                    None => writeln!(out, "no path from {source} to {target}")?,
                }
            } else {
                for step in walker.walk(source, target.as_deref(), traversal)? {
                    writeln!(out, "{}", serde_json::to_string(&step)?)?;
                }
            }
        }
        Commands::Stats => {
            writeln!(out, "{}", serde_json::to_string(&store.stats()?)?)?;
        }
        Commands::Serve { .. } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(crate::http::serve(Arc::new(store), &config.server.bind))?;
        }
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(out: &mut dyn Write, value: &T, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out)?;
    Ok(())
}
