pub mod rates;
pub mod bucketizer;
pub mod stats_service;
pub use stats_service::StatsService;
pub mod board_service;
pub use board_service::{ActivityCache, BoardView, FeedKey, FeedManager};
pub mod sync_service;
pub use sync_service::{SubmissionGuard, SyncBridge};
