pub mod doctor;
pub mod export;
pub mod proxy_usage;
pub mod status;
pub mod watch;
