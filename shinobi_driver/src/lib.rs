// shinobi_driver: runs the shinobi village sim against the wall clock.
//
// The sim crate is headless and has no notion of real time or files. This
// crate supplies both: a driver thread that owns the `Engine`, advances it
// to the wall clock every frame, applies player commands from a channel,
// and autosaves; and the save-file helpers it uses.
//
// Module overview:
// - `driver.rs`:  `start_driver` / `DriverHandle`: the main loop thread.
// - `save.rs`:    Atomic save writes, first-run aware loads, config files.
// - `logging.rs`: `env_logger` setup for the `shinobi` binary.
// - `error.rs`:   `DriverError`.
//
// The `shinobi` binary (`main.rs`) wires these to CLI flags and reads
// JSON-line commands from stdin.

pub mod driver;
pub mod error;
pub mod logging;
pub mod save;

pub use driver::{DriverConfig, DriverHandle, start_driver};
pub use error::DriverError;
