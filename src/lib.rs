pub mod config;
pub mod dispatch;
pub mod error;
pub mod portia;
pub mod routing;

pub use config::{Settings, load_settings};
pub use dispatch::{Dispatcher, MemoryPublisher, Published, Publisher, Record, RecordKind};
pub use error::{ConfigError, DispatchError, ProtocolAnomaly, RequestError};
pub use portia::{ConnectionManager, ConnectionOptions, PortiaClient, Resolution};
pub use routing::{Route, RoutingTable};
