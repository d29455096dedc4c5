pub mod device;
pub mod discovery;
pub mod selector;
pub mod watch;
