pub mod config;
pub mod harvest;
pub mod location;
pub mod markdown;
pub mod models;
pub mod session;
pub mod sources;
pub mod store;
pub mod utils;

pub use config::{HarvestConfig, SourceKind};
pub use harvest::{harvest, HarvestSummary};
pub use location::compose_location;
pub use markdown::DescriptionFormat;
pub use models::{EventData, EventType, Venue};
pub use session::{HttpSession, Page, Session, SessionError};
pub use sources::{combine, EventSource, TruncateOrder, TruncatePolicy};
pub use store::{store_events, StoreReport};
