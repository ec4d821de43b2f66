//! Interfaces to the external collaborators the action library and trigger
//! subsystem depend on.
//!
//! Unlike the repository traits these are object-safe (boxed futures), because
//! the action registry holds them as `Arc<dyn ...>` and swaps implementations
//! per deployment: SQLite or in-memory datastores, configured or disabled
//! transports.

pub mod agent;
pub mod change_feed;
pub mod datastore;
pub mod delivery;
pub mod http;

pub use agent::AgentClient;
pub use change_feed::{BroadcastChangeFeed, ChangeFeed};
pub use datastore::Datastore;
pub use delivery::{MessageTransport, Notification, NotificationChannel, OutboundMessage};
pub use http::{HttpClient, HttpRequest, HttpResponse};
