use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kg_memory::{
    dispatch, export_to_file, import_from_file, Config, ElasticBackend, KnowledgeGraph,
    SearchParams, SortBy,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Knowledge graph admin CLI", long_about = None)]
struct Args {
    /// Elasticsearch node URL (overrides ES_NODE)
    #[arg(short = 'n', long, global = true)]
    node: Option<String>,

    /// Index holding the graph (overrides ES_INDEX)
    #[arg(short = 'i', long, global = true)]
    index: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize the Elasticsearch index
    Init,
    /// Import data from a JSON file
    Import { file: PathBuf },
    /// Export data to a JSON file
    Export { file: PathBuf },
    /// Display statistics about the knowledge graph
    Stats,
    /// Search the knowledge graph
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// relevance, recency (or recent), importance
        #[arg(short, long, default_value_t = SortBy::Relevance)]
        sort_by: SortBy,
        /// Only return entities of these types
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<String>,
    },
    /// Reset the knowledge graph (delete all data)
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Display information about a specific entity
    Entity { name: String },
    /// Display the neighbourhood of an entity
    Related {
        name: String,
        #[arg(short, long, default_value_t = 1)]
        depth: usize,
    },
    /// Invoke an agent tool with JSON arguments
    Tool {
        name: String,
        #[arg(default_value = "{}")]
        args: String,
    },
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut buffer = String::new();
    io::stdin().read_line(&mut buffer)?;
    let answer = buffer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

async fn show_stats(graph: &KnowledgeGraph<ElasticBackend>) -> Result<()> {
    let stats = graph.stats().await.context("Error getting statistics")?;

    println!("Knowledge Graph Statistics");
    println!("=========================");
    println!("Total entities: {}", stats.entity_count);
    println!("Total relations: {}", stats.relation_count);
    println!();
    println!("Entity types:");
    for (entity_type, count) in &stats.entity_types {
        println!("  {}: {}", entity_type, count);
    }
    println!();
    println!("Relation types:");
    for (relation_type, count) in &stats.relation_types {
        println!("  {}: {}", relation_type, count);
    }
    Ok(())
}

async fn show_search(
    graph: &KnowledgeGraph<ElasticBackend>,
    params: SearchParams,
) -> Result<()> {
    let results = graph
        .search(&params)
        .await
        .context("Error searching knowledge graph")?;

    println!("Search Results for \"{}\"", params.query);
    println!("====================================");
    println!("Found {} matches", results.total);
    println!();

    for (i, hit) in results.hits.iter().enumerate() {
        let score = hit
            .score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "{}. {} ({}) [Score: {}]",
            i + 1,
            hit.entity.name,
            hit.entity.entity_type,
            score
        );
        println!("   Observations: {}", hit.entity.observations.len());
        if !hit.highlights.is_empty() {
            println!("   Matches:");
            for (field, fragments) in &hit.highlights {
                for fragment in fragments {
                    println!("   - {}: {}", field, fragment);
                }
            }
        }
        println!();
    }
    Ok(())
}

async fn show_entity(graph: &KnowledgeGraph<ElasticBackend>, name: &str) -> Result<()> {
    let entity = graph
        .get_entity(name)
        .await
        .context("Error getting entity")?
        .ok_or_else(|| anyhow::anyhow!("Entity \"{}\" not found", name))?;
    let relations = graph
        .get_relations_for_entities(&[entity.name.clone()])
        .await
        .context("Error getting entity relations")?;

    println!("Entity: {}", entity.name);
    println!("Type: {}", entity.entity_type);
    println!("Important: {}", if entity.is_important { "Yes" } else { "No" });
    println!("Last read: {}", entity.last_read.to_rfc3339());
    println!("Last write: {}", entity.last_write.to_rfc3339());
    println!("Read count: {}", entity.read_count);
    println!();
    println!("Observations:");
    for (i, observation) in entity.observations.iter().enumerate() {
        println!("  {}. {}", i + 1, observation);
    }
    println!();
    println!("Relations:");
    for relation in &relations {
        let Some(other) = relation.other_end(&entity.name) else {
            continue;
        };
        if relation.from == entity.name {
            println!("  → {} → {}", relation.relation_type, other);
        } else {
            println!("  ← {} ← {}", relation.relation_type, other);
        }
    }
    Ok(())
}

async fn show_related(
    graph: &KnowledgeGraph<ElasticBackend>,
    name: &str,
    depth: usize,
) -> Result<()> {
    let related = graph
        .get_related_entities(name, depth)
        .await
        .context("Error traversing knowledge graph")?;

    println!("Entities within {} hop(s) of \"{}\"", depth, name);
    println!("====================================");
    for entity in &related.entities {
        println!("  {} ({})", entity.name, entity.entity_type);
    }
    println!();
    println!("Relations:");
    for relation in &related.relations {
        println!("  {}", relation.key());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(node) = args.node {
        config.elastic.node = node;
    }
    if let Some(index) = args.index {
        config.elastic.index = index;
    }
    init_logging(config.logging.filter());

    let backend = ElasticBackend::new(config.elastic.clone())?;
    let graph = KnowledgeGraph::new(backend);

    match args.command {
        Command::Init => {
            graph.initialize().await.context("Error initializing index")?;
            println!("Elasticsearch index initialized successfully");
        }
        Command::Import { file } => {
            let report = import_from_file(&graph, &file).await?;
            println!(
                "Imported {} entities and {} relations from {}",
                report.entities,
                report.relations,
                file.display()
            );
            for failure in &report.failures {
                eprintln!(
                    "  record {} ({}): {}",
                    failure.index,
                    failure.target.as_deref().unwrap_or("unparsed"),
                    failure.error
                );
            }
            if !report.is_complete() {
                anyhow::bail!("{} records could not be imported", report.failures.len());
            }
        }
        Command::Export { file } => {
            let summary = export_to_file(&graph, &file).await?;
            println!(
                "Exported {} entities and {} relations to {}",
                summary.entities,
                summary.relations,
                file.display()
            );
        }
        Command::Stats => show_stats(&graph).await?,
        Command::Search {
            query,
            limit,
            sort_by,
            types,
        } => {
            let mut params = SearchParams::new(&query)
                .limit(limit)
                .sort_by(sort_by)
                .highlight(true);
            if !types.is_empty() {
                params = params.entity_types(types);
            }
            show_search(&graph, params).await?;
        }
        Command::Reset { yes } => {
            let prompt = format!(
                "This deletes every entity and relation in index \"{}\". Continue?",
                graph.backend().index()
            );
            if yes || confirm(&prompt)? {
                graph.reset().await.context("Error resetting index")?;
                println!("Knowledge graph has been reset");
            } else {
                println!("Operation cancelled");
            }
        }
        Command::Entity { name } => show_entity(&graph, &name).await?,
        Command::Related { name, depth } => show_related(&graph, &name, depth).await?,
        Command::Tool { name, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("Tool arguments must be valid JSON")?;
            if let Err(e) = graph.initialize().await {
                if !e.is_connectivity() {
                    return Err(e).context("Error initializing index");
                }
                warn!("continuing without index check: {}", e);
            }
            let result = dispatch(&graph, &name, args).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
