pub mod claude;
pub mod error;
pub mod fallback;
pub mod openai;
pub mod provider;
pub mod schema;
pub mod usage;
pub mod util;

pub use claude::Claude;
pub use error::AiError;
pub use fallback::{
    classify_error, configured_models, FailureKind, FallbackExtraction, FallbackProvider,
    ModelConfig,
};
pub use openai::OpenAi;
pub use provider::{parse_model_spec, LlmProvider, ProviderKind, DEFAULT_MODEL_SPEC};
pub use schema::StructuredOutput;
pub use usage::{Extraction, TokenUsage};
pub use util::{strip_code_blocks, truncate_to_char_boundary};
