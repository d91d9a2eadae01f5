// Domain-layer modules and shared errors/models
pub mod planner {
    pub use crate::planner::*;
}

pub mod projection {
    pub use crate::projection::*;
}

pub mod insights {
    pub use crate::insights::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
