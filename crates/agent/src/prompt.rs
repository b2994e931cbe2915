//! Prompt rendering for the retrieval chain.
//!
//! The QA template carries `{context}` and `{question}` placeholders. Retrieved
//! documents become the context; prior turns optionally become a separate
//! "Conversation so far" block.

use ragbot_core::retriever::DocumentRef;
use ragbot_memory::Turn;

/// A QA prompt template with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute both placeholders in a single pass, so placeholder-like
    /// text inside the context or the question is left untouched.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{question}") {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }

        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(ragbot_config::DEFAULT_TEMPLATE)
    }
}

/// Join document contents, best first, separated by blank lines.
///
/// Documents without text contribute nothing.
pub fn render_context(documents: &[DocumentRef]) -> String {
    documents
        .iter()
        .map(|d| d.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render prior turns as a block, oldest first. `None` when there are none.
pub fn render_history(turns: &[Turn]) -> Option<String> {
    if turns.is_empty() {
        return None;
    }

    let mut block = String::from("Conversation so far:");
    for turn in turns {
        block.push_str("\n- ");
        block.push_str(turn.text());
    }
    Some(block)
}
