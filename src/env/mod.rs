mod env_posix;
mod interface;
mod limiter;

pub use crate::env::env_posix::{PosixEnv, TestEnv};
pub use crate::env::interface::Env;
pub(crate) use crate::env::limiter::Limiter;
