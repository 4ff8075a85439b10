pub mod cmp;
pub mod logger;
pub mod time;
