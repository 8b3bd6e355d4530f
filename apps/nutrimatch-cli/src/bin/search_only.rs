use std::path::PathBuf;

use clap::{ArgAction, Parser};

use nutrimatch_cli::{index_dir, init_tracing, load_settings, LexicalIndex};

/// BM25-only search over a built index, for inspecting lexical scores.
#[derive(Parser)]
#[command(name = "nutrimatch-lexical", version)]
struct Args {
    query: String,

    #[arg(long)]
    index_dir: Option<PathBuf>,

    #[arg(short = 'k', long, default_value_t = 10)]
    limit: usize,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let settings = load_settings()?;
    let dir = index_dir(args.index_dir, &settings);

    let index = LexicalIndex::open(&dir).await?;

    println!("Query: {}", args.query);
    println!("Tokens: {:?}", nutrimatch_core::tokenize(&args.query));
    for (i, (score, entry)) in index.search(&args.query, args.limit)?.into_iter().enumerate() {
        println!(
            "  {:>2}. score={:.4}  id={:<8} {:<48} {}",
            i + 1,
            score,
            entry.id,
            entry.name_en,
            entry.calories_per_100g
        );
    }
    Ok(())
}
