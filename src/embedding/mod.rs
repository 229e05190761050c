// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - text normalization, vector providers and the vector store

pub mod normalizer;
pub mod provider;
pub mod storage;

pub use normalizer::ContentNormalizer;
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use provider::FastEmbedder;
pub use provider::{
    create_provider, CommandProvider, EmbeddingProvider, HashEmbedder, DEFAULT_EMBEDDING_DIM,
};
pub use storage::{
    EmbeddingStats, EmbeddingStore, ExactQuery, NeighborQuery, ScoredUnit, SqliteStore,
    UnitTypeStats,
};
