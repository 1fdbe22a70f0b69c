pub mod intersection;
pub mod statistics;
