pub mod performance;
pub mod recorder;
pub mod storage;

pub use recorder::ResultRecorder;
pub use storage::RunStorage;
