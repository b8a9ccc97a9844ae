/// Question pool sources and seeded question selection.
pub mod question_bank;
/// Storage error types shared by data sources.
pub mod storage;
