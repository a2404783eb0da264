pub mod gateway;
pub mod logbuf;
pub mod poller;
pub mod router;
pub mod server;
pub mod store;
