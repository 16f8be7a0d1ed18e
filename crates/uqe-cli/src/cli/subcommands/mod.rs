mod cache;
mod definition;

pub use cache::CacheCommands;
pub use definition::DefinitionCommands;
