mod llm;

pub use llm::{HttpLlmProvider, HttpVisionProvider};
