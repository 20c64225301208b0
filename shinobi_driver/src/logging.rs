use env_logger::{Builder, Env};
use log::LevelFilter;

/// Install the global logger. `RUST_LOG` wins when set; otherwise `verbose`
/// picks debug over info.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let env = Env::default().default_filter_or(level.to_string());
    let mut builder = Builder::from_env(env);

    // Already installed (tests, repeated calls): keep the first one.
    let _ = builder.try_init();
}
