pub mod store;
pub use store::{BoardQuery, FunnelStore, NewActivity, RangeQuery};
pub mod funnel_repo;
pub use funnel_repo::FunnelRepository;
pub mod notify;
pub use notify::{ChangeEvent, ChangeHub, ChangeKind, StoreTable};
