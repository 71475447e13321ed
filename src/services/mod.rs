pub mod generation;
pub mod normalize;
pub mod prompts;
pub mod request;
