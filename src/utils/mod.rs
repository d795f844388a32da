/// Utilities for classification tasks
pub mod classes;
