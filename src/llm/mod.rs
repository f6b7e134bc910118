pub mod completion;
pub mod cross_encoder;
pub mod embeddings;
pub mod query_expand;
