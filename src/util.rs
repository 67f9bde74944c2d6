pub mod edge_detector;
pub mod logger;
pub mod unit;
