pub mod staging;
pub mod storage;
