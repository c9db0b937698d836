//! Chatter: one conversation API over several LLM chat backends.

pub mod core;
pub mod inference;

#[cfg(test)]
pub mod test_support;
