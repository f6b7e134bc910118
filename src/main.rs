use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pcos_rag::api;
use pcos_rag::config::Config;
use pcos_rag::ingest::index_corpora;
use pcos_rag::llm::embeddings::HttpEmbedder;
use pcos_rag::rag::{build_retrievers, create_rag_chain, RagContext};
use pcos_rag::state::AppState;

const SAMPLE_QUESTIONS: [&str; 4] = [
    "What causes insulin resistance in PCOS?",
    "What are the best treatments for PCOS hirsutism?",
    "How does metformin help with PCOS?",
    "What lifestyle changes help manage PCOS?",
];

#[derive(Parser)]
#[command(name = "pcos-rag")]
#[command(version)]
#[command(about = "Evidence-grounded PCOS question answering over research and patient articles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed the corpora and write the vector indexes
    Index {
        /// Skip the patient article corpus
        #[arg(long)]
        no_patient: bool,
    },

    /// Answer questions from the command line, sharing one history
    Ask {
        /// Skip the patient article corpus
        #[arg(long)]
        no_patient: bool,

        /// Expand each question into LLM paraphrases before retrieval
        #[arg(long)]
        multiquery: bool,

        /// Reorder retrieved documents with the cross-encoder
        #[arg(long)]
        rerank: bool,

        /// Questions to ask (defaults to a built-in sample set)
        questions: Vec<String>,
    },

    /// Start the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    match cli.command {
        Commands::Index { no_patient } => index(config, !no_patient).await,
        Commands::Ask {
            no_patient,
            multiquery,
            rerank,
            questions,
        } => ask(config, !no_patient, multiquery, rerank, questions).await,
        Commands::Serve => serve(config).await,
    }
}

async fn index(config: Config, include_patient_data: bool) -> anyhow::Result<()> {
    config.validate_embedding()?;

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(120))
        .build()?;
    let embedder = HttpEmbedder::new(client, config.embedding.clone());

    index_corpora(&config, &embedder, include_patient_data).await
}

async fn ask(
    config: Config,
    include_patient_data: bool,
    use_multiquery: bool,
    use_rerank: bool,
    questions: Vec<String>,
) -> anyhow::Result<()> {
    let ctx = RagContext::init(config)?;
    let retrievers = build_retrievers(&ctx, include_patient_data)?;
    let chain = create_rag_chain(&ctx, retrievers, use_multiquery, use_rerank)?;

    let questions = if questions.is_empty() {
        SAMPLE_QUESTIONS.iter().map(|q| q.to_string()).collect()
    } else {
        questions
    };

    let mut history = Vec::new();
    for question in &questions {
        println!("\nQUESTION: {question}");
        let answer = chain.call(question, &mut history).await?;

        println!("\nANSWER:\n{}", answer.answer);
        println!("\nSOURCES:");
        for (i, doc) in answer.sources.iter().take(3).enumerate() {
            println!(
                "{}. {} - {}",
                i + 1,
                doc.title().unwrap_or("N/A"),
                doc.source().unwrap_or("N/A")
            );
        }
    }

    println!("\nCHAT HISTORY:");
    for turn in &history {
        println!("\n{turn}");
    }

    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let state = AppState::from_config(config)?;
    tracing::info!("RAG chain ready with {} retrievers", state.chain.retriever_count());

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_without_questions_uses_samples() {
        let cli = Cli::try_parse_from(["pcos-rag", "ask"]).unwrap();
        let Commands::Ask { questions, .. } = cli.command else {
            panic!("expected ask");
        };
        assert!(questions.is_empty());
        assert_eq!(SAMPLE_QUESTIONS.len(), 4);
        assert_eq!(SAMPLE_QUESTIONS[0], "What causes insulin resistance in PCOS?");
        assert!(SAMPLE_QUESTIONS.iter().all(|q| q.contains("PCOS")));
    }

    #[test]
    fn test_index_flag_parses() {
        let cli = Cli::try_parse_from(["pcos-rag", "index", "--no-patient"]).unwrap();
        assert!(matches!(cli.command, Commands::Index { no_patient: true }));
    }
}
