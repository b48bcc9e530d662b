mod server;

pub use server::run_daemon;
