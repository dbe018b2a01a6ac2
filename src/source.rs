pub mod file;

pub use self::file::{DelimitedSource, Resource};
