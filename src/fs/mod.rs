//! Filesystem state: the `.work/` directory, run lock, and run-state store

pub mod locking;
pub mod state_store;
pub mod work_dir;

pub use locking::RunLock;
pub use state_store::{write_atomic, StateStore};
pub use work_dir::{WorkDir, WORK_DIR_NAME};
