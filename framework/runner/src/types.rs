/// Recommended error type for your scenario `main` function and for scenario `setup` and
/// `teardown`. Use `?` to propagate errors.
pub type YardstickResult<T> = anyhow::Result<T>;
