//! 可观测性：日志初始化
//!
//! 默认 info，可通过 RUST_LOG 覆盖（如 `RUST_LOG=prosearch=debug`）。日志写到 stderr，stdout 只留给最终回答。

use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
