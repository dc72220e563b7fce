// Domain-layer modules and shared errors/models
pub mod assembler {
    pub use crate::assembler::*;
}

pub mod geo {
    pub use crate::geo::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod normalizer {
    pub use crate::normalizer::*;
}

pub mod report {
    pub use crate::report::*;
}

pub mod errors {
    pub use crate::errors::*;
}
