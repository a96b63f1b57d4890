pub mod config;
pub mod connection;
pub mod exception;
pub mod param;
pub mod pool;
pub mod request;
pub mod response;
pub mod rio;
pub mod server;
pub mod util;

pub use config::Config;
pub use connection::{Connection, Disposition};
pub use exception::Exception;
pub use param::{HttpRequestMethod, HttpVersion};
pub use pool::{ConnectionPool, SlotArena};
pub use request::{Progress, Request, RequestParser};
pub use response::Response;
pub use rio::LineReader;
pub use server::Server;
pub use util::HtmlBuilder;
