// Library root: exposes the adapter and wiring so integration tests and the
// binary share them.

pub mod app;
pub mod client;
pub mod signals;
