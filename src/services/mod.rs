pub mod memory;
pub mod postgres;
pub mod registry;

pub use memory::InMemoryRegistry;
pub use postgres::PostgresRegistry;
pub use registry::{Registry, RegistryError};
