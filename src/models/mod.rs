pub mod connection;
pub mod enums;
pub mod health_log;
pub mod note;
pub mod report;
pub mod user;

pub use connection::*;
pub use enums::*;
pub use health_log::*;
pub use note::*;
pub use report::*;
pub use user::*;
