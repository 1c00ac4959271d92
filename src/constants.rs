/// Outcome channel read by the regression style strategies.
pub const OUTCOME: usize = 0;
pub const DEFAULT_CI_GROUP_SIZE: usize = 2;
pub const DEFAULT_LAMBDA: f64 = 0.1;
/// Smallest ratio between the smallest and largest pivot of a factorization
/// before the system is reported as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-13;
