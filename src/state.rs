use std::sync::Arc;

use crate::config::Config;
use crate::rag::{build_retrievers, create_rag_chain, RagChain, RagContext};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chain: Arc<RagChain>,
    /// The chain assumes one caller at a time; requests queue on this permit.
    pub ask_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config, chain: RagChain) -> Self {
        Self {
            config: Arc::new(config),
            chain: Arc::new(chain),
            ask_semaphore: Arc::new(tokio::sync::Semaphore::new(1)),
        }
    }

    /// Validate config, load corpora and indexes, and assemble the chain with
    /// the flags from [`crate::config::ChainConfig`].
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let ctx = RagContext::init(config)?;
        let flags = ctx.config.chain.clone();

        let retrievers = build_retrievers(&ctx, flags.include_patient_data)?;
        let chain = create_rag_chain(&ctx, retrievers, flags.use_multiquery, flags.use_rerank)?;

        Ok(Self::new(ctx.config, chain))
    }
}
