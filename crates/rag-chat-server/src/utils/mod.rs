pub mod error;
pub mod similarity;

pub use similarity::cosine_similarity;
