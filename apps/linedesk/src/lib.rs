pub mod config;
pub mod console;
pub mod dialpad;
pub mod dispatcher;
pub mod recents;
pub mod session;
pub mod settings;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod view;

pub use config::ClientConfig;
pub use dispatcher::{ActionDispatcher, Confirm, DispatchError, LineIntent, Outcome, ToneOutcome};
pub use session::{Session, SessionError};
pub use store::{LineChange, LineRecord, LineStore, UpdateOrigin};
pub use transport::{ConnectError, PushClient, PushConfig, TransportError, TransportEvent};
pub use view::{LineBoard, LineView, PrimaryAction, StatusTone, format_duration, render};
