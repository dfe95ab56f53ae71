pub mod config;
pub mod creds;
pub mod error;
pub mod ftp;
pub mod logging;
pub mod mock_remote;
pub mod orchestrator;
pub mod remote;
pub mod sink;
pub mod worker;

pub use error::ClientError;
pub use error::SessionError;
pub use worker::Direction;
pub use worker::Job;
