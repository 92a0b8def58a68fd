pub mod gbm;
pub mod metrics;
pub mod trainer;
