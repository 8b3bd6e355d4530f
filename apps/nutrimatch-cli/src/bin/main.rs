use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use nutrimatch_cli::{index_dir, init_tracing, load_settings, print_results};
use nutrimatch_core::config::expand_path;
use nutrimatch_core::dataset::DatasetReader;
use nutrimatch_embed::shared_embedder;
use nutrimatch_hybrid::{
    build_reference_index, estimate_dish, match_dish, BuildOptions, HybridRetriever, Ingredient, Selection,
};

#[derive(Parser)]
#[command(name = "nutrimatch")]
#[command(about = "Match free-text food names against a nutrition reference table", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Index directory (defaults to data.index_dir)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the reference index from a Ciqual CSV export
    Ingest {
        /// Dataset CSV (defaults to data.dataset_csv)
        csv: Option<PathBuf>,

        /// Only index the first N rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Match one food name
    Query {
        text: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Match several names with one encoder call
    Batch {
        #[arg(required = true)]
        texts: Vec<String>,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Match a dish's ingredients and estimate its calories
    Dish {
        /// Ingredients as NAME:GRAMS, e.g. "chicken breast:150"
        #[arg(required = true)]
        ingredients: Vec<Ingredient>,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings()?;
    let index_dir = index_dir(cli.index_dir, &settings);
    tracing::debug!(index_dir = %index_dir.display(), backend = ?settings.embedding.backend, "settings loaded");
    let embedder = shared_embedder(&settings.embedding)?;

    match cli.command {
        Commands::Ingest { csv, limit } => {
            let csv = csv.unwrap_or_else(|| expand_path(&settings.data.dataset_csv));
            let entries = DatasetReader::new(settings.data.csv_delimiter)?.with_limit(limit).read(&csv)?;
            let options = BuildOptions::new(&settings.data.table_name).with_batch_size(settings.embedding.batch_size);
            let manifest = build_reference_index(entries, embedder, &index_dir, &options).await?;
            println!(
                "Indexed {} foods into {} (encoder {}, dim {})",
                manifest.entry_count,
                index_dir.display(),
                manifest.embedder_id,
                manifest.dim
            );
        }
        Commands::Query { text, top_k } => {
            let top_k = top_k.unwrap_or(settings.retrieval.top_k);
            let retriever = HybridRetriever::open(&index_dir, embedder, settings.retrieval.clone()).await?;
            let results = retriever.retrieve(&text, top_k).await?;
            print_results(&text, &results, cli.json)?;
        }
        Commands::Batch { texts, top_k } => {
            let top_k = top_k.unwrap_or(settings.retrieval.top_k);
            let retriever = HybridRetriever::open(&index_dir, embedder, settings.retrieval.clone()).await?;
            let batches = retriever.retrieve_batch(&texts, top_k).await?;
            for (text, results) in texts.iter().zip(&batches) {
                print_results(text, results, cli.json)?;
            }
        }
        Commands::Dish { ingredients, top_k } => {
            let top_k = top_k.unwrap_or(settings.retrieval.top_k);
            let retriever = HybridRetriever::open(&index_dir, embedder, settings.retrieval.clone()).await?;
            let matches = match_dish(&retriever, &ingredients, top_k).await?;
            let selections: Vec<Selection> = matches.iter().map(|m| m.auto_select()).collect();
            let estimate = estimate_dish(&selections);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "matches": matches, "estimate": estimate }))?);
                return Ok(());
            }
            for line in &estimate.lines {
                let food = line.food_name.as_deref().unwrap_or("(no match)");
                let kcal = line.kcal.map_or_else(|| "unknown".to_string(), |k| format!("{k:.0} kcal"));
                println!("  {:<24} {:>7.1} g  -> {:<40} {}", line.ingredient, line.quantity_grams, food, kcal);
            }
            println!("Total: {:.0} kcal", estimate.total_kcal);
            if !estimate.is_complete() {
                println!("Not counted (unknown calories): {}", estimate.unknown.join(", "));
            }
        }
    }
    Ok(())
}
