pub mod config_loader;
pub mod export;
pub mod id_card;
pub mod judging;
pub mod qr;
pub mod results;
pub mod snapshot_loader;
pub mod store;
