// Library for tests to access modules

pub mod activity;
pub mod config;
pub mod delta;
pub mod docker_repo;
pub mod models;
pub mod routes;
pub mod sampler;
pub mod store;
pub mod sysinfo_repo;
pub mod version;
pub mod worker;
