pub mod compare;
pub mod core;
pub mod export;
pub mod scrape;
pub mod students;
