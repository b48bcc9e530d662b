pub mod history_store;
pub mod power_state;
pub mod recorder;
pub mod state_log;

pub use history_store::{DatabaseStats, HistoryStore, HistoryStoreError};
pub use recorder::Recorder;
