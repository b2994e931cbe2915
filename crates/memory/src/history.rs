//! Token-budgeted conversation history.
//!
//! An ordered buffer of turns with a running cost total. When the total
//! reaches the budget threshold, the oldest turns are dropped first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Fraction of the LLM response budget the history may occupy.
pub const HISTORY_BUDGET_RATIO: f64 = 0.8;

/// Approximate token cost of `text`: the number of pieces produced by
/// splitting on a single space.
///
/// Not a tokenizer. Empty text costs 1 and consecutive spaces each add a
/// piece, so the cost is never zero.
pub fn approx_token_cost(text: &str) -> usize {
    text.split(' ').count()
}

/// Eviction threshold for a response budget of `max_tokens`.
pub fn history_threshold(max_tokens: u32) -> usize {
    (f64::from(max_tokens) * HISTORY_BUDGET_RATIO).floor() as usize
}

/// One entry in the history. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    text: String,
    approx_token_cost: usize,
}

impl Turn {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let approx_token_cost = approx_token_cost(&text);
        Self {
            text,
            approx_token_cost,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn approx_token_cost(&self) -> usize {
        self.approx_token_cost
    }
}

/// FIFO buffer of [`Turn`]s whose `total_cost` always equals the sum of
/// the costs of the turns it holds.
#[derive(Debug, Clone, Default)]
pub struct TokenBudgetedHistory {
    turns: VecDeque<Turn>,
    total_cost: usize,
}

impl TokenBudgetedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the tail.
    pub fn append(&mut self, turn: Turn) {
        self.total_cost += turn.approx_token_cost;
        self.turns.push_back(turn);
    }

    /// Drop head turns while `total_cost >= threshold`.
    ///
    /// May empty the buffer entirely when a single turn is over budget.
    /// Returns the number of evicted turns.
    pub fn evict_if_over_budget(&mut self, threshold: usize) -> usize {
        let mut evicted = 0;
        while self.total_cost >= threshold {
            let Some(turn) = self.turns.pop_front() else {
                break;
            };
            self.total_cost -= turn.approx_token_cost;
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                evicted,
                remaining = self.turns.len(),
                total_cost = self.total_cost,
                threshold,
                "Evicted oldest history turns"
            );
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn total_cost(&self) -> usize {
        self.total_cost
    }

    /// Turns oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}
