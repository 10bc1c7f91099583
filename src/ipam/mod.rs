pub mod client;
pub mod mgmt;
pub mod types;

pub use client::IpamClient;
pub use mgmt::{lookup_mgmt_address, relabel_mgmt_block, reserve_mgmt_block, AddressBook, MgmtBlock};
