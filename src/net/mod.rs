pub mod frame;
pub mod message;
pub mod packet;
pub mod relay;
pub mod server;
pub mod session;
