pub mod error;
pub mod export;
pub mod file_store;
pub mod notifications;
pub mod points;
pub mod preferences;
pub mod session;
pub mod telemetry;
pub mod threads;

pub use error::{ChatError, Result};
pub use file_store::FileStore;
pub use notifications::{NotificationDriver, NotificationQueue, ToastEvent};
pub use points::PointsLedger;
pub use preferences::PreferencesStore;
pub use session::ChatSession;
pub use threads::ThreadStore;
