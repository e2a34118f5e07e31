//! Test utilities for hmd-tether
//!
//! Provides mock values and helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{create_mock_description, create_mock_pixels};
//!
//! let desc = create_mock_description(0x18d1, 0x2d00);
//! assert!(desc.is_accessory());
//!
//! let pixels = create_mock_pixels(4, 2);
//! assert_eq!(pixels.len(), 4 * 2 * 4);
//! ```

use crate::usb_types::{DeviceDescription, DeviceIdentity};
use protocol::ViewerParams;
use std::future::Future;
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock DeviceDescription for testing
pub fn create_mock_description(vendor_id: u16, product_id: u16) -> DeviceDescription {
    DeviceDescription {
        identity: DeviceIdentity::new(vendor_id, product_id),
        manufacturer: "Test Manufacturer".to_string(),
        product: format!("Test Phone {:04x}", product_id),
    }
}

/// Viewer parameters used throughout the tests (1920x1080, 64 mm IPD)
pub fn create_mock_viewer() -> ViewerParams {
    ViewerParams {
        width: 1920,
        height: 1080,
        interpupillary_distance: 0.064,
    }
}

/// Tightly packed BGRX test image with a horizontal gradient
pub fn create_mock_pixels(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for _ in 0..height {
        for x in 0..width {
            let v = ((x * 255) / width.max(1)) as u8;
            pixels.extend_from_slice(&[v, v / 2, 255 - v, 0]);
        }
    }
    pixels
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```no_run
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Poll `condition` until it holds or `timeout` elapses
///
/// For tests that observe worker threads from the outside.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_pixels_layout() {
        let pixels = create_mock_pixels(8, 3);
        assert_eq!(pixels.len(), 8 * 3 * 4);
        // X byte is always zero
        assert!(pixels.chunks(4).all(|px| px[3] == 0));
    }

    #[test]
    fn test_wait_until() {
        assert!(wait_until(Duration::from_millis(50), || true));
        assert!(!wait_until(Duration::from_millis(20), || false));
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .await;
        assert!(result.is_err());
    }
}
