pub mod prompt;
pub mod request;
pub mod result;
