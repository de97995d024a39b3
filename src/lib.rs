pub mod compactor;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod observability;
pub mod policy;
pub mod repository;
pub mod settings;
pub mod store;
pub mod wire;
