pub mod azure;
pub mod openai;
