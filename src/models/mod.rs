pub mod chat;
pub mod refine;
