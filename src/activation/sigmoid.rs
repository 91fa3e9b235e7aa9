/// Logistic sigmoid, `1 / (1 + e^-x)`.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Slope of the sigmoid written in terms of its output `y = sigmoid(x)`:
/// `y * (1 - y)`. Zero once `y` saturates to exactly 0 or 1.
pub fn sigmoid_slope(y: f64) -> f64 {
    y * (1.0 - y)
}
