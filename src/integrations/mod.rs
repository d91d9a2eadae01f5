//! Backend integrations.

pub mod backend_client {
    pub use crate::backend_client::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod circuit_breaker {
    pub use crate::circuit_breaker::*;
}
