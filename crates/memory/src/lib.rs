//! Memory for RagBot.
//!
//! - [`TokenBudgetedHistory`]: the rolling, token-budgeted conversation buffer
//! - [`FileTurnLog`] / [`InMemoryTurnLog`]: per-user turn persistence
//! - [`InMemoryIndex`]: an in-process vector index

pub mod history;
pub mod in_memory;
pub mod file_backend;
pub mod vector;

pub use history::{approx_token_cost, history_threshold, TokenBudgetedHistory, Turn};
pub use in_memory::InMemoryTurnLog;
pub use file_backend::FileTurnLog;
pub use vector::{cosine_similarity, InMemoryIndex};
