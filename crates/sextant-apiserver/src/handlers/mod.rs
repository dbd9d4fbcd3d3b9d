pub mod diagnostics;
pub mod health;
pub mod prioritize;

// Re-export handler functions
pub use diagnostics::*;
pub use health::*;
pub use prioritize::*;
