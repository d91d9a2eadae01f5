// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod planner_handler {
    pub use crate::planner_handler::*;
}

pub mod routes {
    pub use crate::routes::*;
}
