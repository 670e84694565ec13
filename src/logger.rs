//! Log setup for the binary. The library itself only talks to the `log`
//! facade; `RUST_LOG` picks the level and defaults to `warn`.

use env_logger::{Builder, Env};

pub fn init() {
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
}

/// For tests: a second call is not an error, and output goes through the
/// test harness.
pub fn init_for_tests() {
    let _ = Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
