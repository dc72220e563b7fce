//! External service integrations.

pub mod token {
    pub use crate::token::*;
}

pub mod paginator {
    pub use crate::paginator::*;
}
