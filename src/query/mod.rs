pub mod builder;

pub use builder::Filter;
