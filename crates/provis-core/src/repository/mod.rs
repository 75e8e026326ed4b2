mod composite;
mod memory;
mod traits;

pub use composite::CompositeRepository;
pub use memory::InMemoryRepository;
pub use traits::Repository;
