use std::fmt;

use ecrag_core::Chunk;
use ecrag_llm::{LlmProvider, Message};
use tracing::{error, info};

/// Returned without calling the model when retrieval finds nothing.
pub const NO_RELEVANT_INFORMATION: &str =
    "No relevant information found. Please check that the question is accurate.";

/// The reply the model is told to give when the context does not cover the question.
pub const NOT_FOUND_REPLY: &str = "Not found in the knowledge base.";

const PROMPT_HEADER: &str = "You are a question-answering assistant for cross-border e-commerce.
Answer only from the knowledge base content below. Do not make up information.
If the knowledge base does not contain the answer, reply exactly: \"Not found in the knowledge base.\"
Cite the source page number for every piece of information you use.

Knowledge base content:
";

const QUESTION_LABEL: &str = "\n\nQuestion: ";

/// Result of answering a question. Every failure mode is a value, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Answered(String),
    NoRelevantInformation,
    Failed(String),
}

impl AnswerOutcome {
    /// The user-visible text for this outcome.
    pub fn text(&self) -> String {
        match self {
            AnswerOutcome::Answered(answer) => answer.clone(),
            AnswerOutcome::NoRelevantInformation => NO_RELEVANT_INFORMATION.to_string(),
            AnswerOutcome::Failed(reason) => format!("Question answering failed: {reason}"),
        }
    }
}

impl fmt::Display for AnswerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Render selected chunks as the model's context, one block per chunk with its
/// 1-based page number.
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("Source: page {}\nContent: {}", c.page_number(), c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Context and question are inserted verbatim; neither is scanned for placeholders.
pub fn build_prompt(context: &str, question: &str) -> String {
    let mut prompt = String::with_capacity(
        PROMPT_HEADER.len() + context.len() + QUESTION_LABEL.len() + question.len(),
    );
    prompt.push_str(PROMPT_HEADER);
    prompt.push_str(context);
    prompt.push_str(QUESTION_LABEL);
    prompt.push_str(question);
    prompt
}

/// Generates the final answer from the selected chunks.
pub struct Synthesizer {
    llm: Box<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl Synthesizer {
    pub fn new(llm: Box<dyn LlmProvider>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            llm,
            temperature,
            max_tokens,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.llm.name()
    }

    pub async fn synthesize(&self, question: &str, chunks: &[Chunk]) -> AnswerOutcome {
        if chunks.is_empty() {
            return AnswerOutcome::NoRelevantInformation;
        }

        let prompt = build_prompt(&format_context(chunks), question);
        match self
            .llm
            .complete(vec![Message::user(prompt)], self.temperature, self.max_tokens)
            .await
        {
            Ok(answer) => {
                let answer = answer.trim().to_string();
                let preview: String = answer.chars().take(50).collect();
                info!(question = %question, answer = %preview, "question answered");
                AnswerOutcome::Answered(answer)
            }
            Err(e) => {
                error!(provider = self.llm.name(), error = %e, "answer generation failed");
                AnswerOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ecrag_llm::LlmError;
    use std::sync::{Arc, Mutex};

    struct ScriptedLlm {
        reply: Result<String, u16>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedLlm {
        /// The provider plus a handle to the prompts it receives.
        fn new(reply: Result<&str, u16>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            let llm = Self {
                reply: reply.map(str::to_string),
                prompts: prompts.clone(),
            };
            (llm, prompts)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            messages: Vec<Message>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(messages[0].content.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(LlmError::ApiError {
                    status: *status,
                    body: "rate limited".into(),
                }),
            }
        }
    }

    fn chunk(page_index: usize, content: &str) -> Chunk {
        Chunk {
            index: 0,
            content: content.into(),
            source: "rules.pdf".into(),
            page_index,
            oversized: false,
        }
    }

    #[test]
    fn context_uses_one_based_pages() {
        let ctx = format_context(&[chunk(0, "退货期30天"), chunk(4, "运费买家承担")]);
        assert_eq!(
            ctx,
            "Source: page 1\nContent: 退货期30天\n\nSource: page 5\nContent: 运费买家承担"
        );
    }

    #[test]
    fn prompt_fills_placeholders() {
        let prompt = build_prompt("CTX", "退货几天？");
        assert!(prompt.contains("Knowledge base content:\nCTX"));
        assert!(prompt.ends_with("Question: 退货几天？"));
        assert!(prompt.contains(NOT_FOUND_REPLY));
        assert!(!prompt.contains("{context}"));
    }

    #[test]
    fn braces_in_context_and_question_are_kept_verbatim() {
        let ctx = format_context(&[chunk(2, "模板说明：字段 {question} 由系统填写。")]);
        let prompt = build_prompt(&ctx, "退货几天 {context}");
        assert!(prompt.contains("Content: 模板说明：字段 {question} 由系统填写。"));
        assert!(prompt.ends_with("Question: 退货几天 {context}"));
        assert_eq!(prompt.matches("退货几天").count(), 1);
    }

    #[test]
    fn outcome_texts() {
        assert_eq!(AnswerOutcome::NoRelevantInformation.text(), NO_RELEVANT_INFORMATION);
        assert_eq!(
            AnswerOutcome::Failed("timeout".into()).to_string(),
            "Question answering failed: timeout"
        );
        assert_eq!(AnswerOutcome::Answered("ok".into()).text(), "ok");
    }

    #[tokio::test]
    async fn empty_context_skips_model() {
        let (llm, prompts) = ScriptedLlm::new(Ok("unused"));
        let synth = Synthesizer::new(Box::new(llm), 0.1, 256);
        let outcome = synth.synthesize("运费？", &[]).await;
        assert_eq!(outcome, AnswerOutcome::NoRelevantInformation);
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn answer_is_trimmed() {
        let (llm, prompts) = ScriptedLlm::new(Ok("  30 days (page 1).\n"));
        let synth = Synthesizer::new(Box::new(llm), 0.1, 256);
        let outcome = synth.synthesize("退货几天？", &[chunk(0, "退货期30天")]).await;
        assert_eq!(outcome, AnswerOutcome::Answered("30 days (page 1).".into()));
        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("Source: page 1\nContent: 退货期30天"));
    }

    #[tokio::test]
    async fn provider_error_becomes_failed() {
        let (llm, _) = ScriptedLlm::new(Err(429));
        let synth = Synthesizer::new(Box::new(llm), 0.1, 256);
        let outcome = synth.synthesize("退货几天？", &[chunk(0, "退货期30天")]).await;
        assert!(matches!(outcome, AnswerOutcome::Failed(_)));
        assert!(outcome.text().starts_with("Question answering failed: API error: 429"));
    }
}
