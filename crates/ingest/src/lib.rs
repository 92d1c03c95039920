pub mod document;
pub mod embedding;
