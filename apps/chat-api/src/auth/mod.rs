pub mod identity;
pub mod membership;
pub mod middleware;
