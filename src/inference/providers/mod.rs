mod anthropic;
mod generic;
mod openai;

pub use anthropic::AnthropicFormat;
pub use generic::GenericFormat;
pub use openai::OpenAiFormat;
