pub mod access_keys;
pub mod account;
pub mod instances;
pub mod regions;
pub mod s3;
pub mod snapshots;
pub mod users;
pub mod volumes;
pub mod wait;
