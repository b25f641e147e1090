mod listen_endpoint;

pub use listen_endpoint::ListenEndpoint;
use uuid::Uuid;

pub type SessionId = Uuid;
