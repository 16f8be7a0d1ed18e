pub mod build;
pub mod cache;
pub mod definition;
pub mod dispatch;
pub mod execute;
pub mod schema;
pub mod validate;
