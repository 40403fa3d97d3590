//! Prompt assembly for the question-answering chain

use crate::config::PromptConfig;
use crate::history::ChatMessage;
use crate::rag::Document;

/// Separator placed between retrieved passages.
pub const DOCUMENT_SEPARATOR: &str = "\n---\n";

/// Concatenate the text of retrieved documents.
pub fn format_docs(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| doc.page_content.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

/// A system + human message pair with `{chat_history}`, `{context}` and
/// `{question}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
    human: String,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>, human: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            human: human.into(),
        }
    }

    pub fn from_config(config: &PromptConfig) -> Self {
        Self::new(config.system.clone(), config.human.clone())
    }

    pub fn format(&self, chat_history: &str, context: &str, question: &str) -> Vec<ChatMessage> {
        let vars = [
            ("chat_history", chat_history),
            ("context", context),
            ("question", question),
        ];

        vec![
            ChatMessage::system(render(&self.system, &vars)),
            ChatMessage::user(render(&self.human, &vars)),
        ]
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::from_config(&PromptConfig::default())
    }
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Substituted values are never re-scanned, so a question containing
/// `{context}` is passed through literally. Unknown placeholders are kept.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let replaced = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });

        match replaced {
            Some((value, end)) => {
                output.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}
