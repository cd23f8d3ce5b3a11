/// Database model definitions.
pub mod models;
/// Randomizer persistence backends.
pub mod randomizer_store;
/// Storage abstraction layer for database operations.
pub mod storage;
