//! Test utilities for hid-poller
//!
//! Provides descriptor fixtures and async helpers for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_descriptor;
//!
//! let descriptor = create_mock_descriptor(0x37a8, 0x0003, 0xFF00, 1, "/dev/hidraw0");
//! assert_eq!(descriptor.vendor_id, 0x37a8);
//! ```

use protocol::DeviceDescriptor;
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock DeviceDescriptor for testing
///
/// # Arguments
/// * `vendor_id` - USB Vendor ID
/// * `product_id` - USB Product ID
/// * `usage_page` - HID usage page
/// * `usage` - HID usage
/// * `path` - Opaque OS path
pub fn create_mock_descriptor(
    vendor_id: u16,
    product_id: u16,
    usage_page: u16,
    usage: u16,
    path: &str,
) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id,
        product_id,
        usage_page,
        usage,
        path: path.to_string(),
        product: Some(format!("Test Product {:04x}", product_id)),
        interface_number: -1,
    }
}

/// Create the interfaces a typical composite keyboard exposes
///
/// Only the last entry carries a vendor-defined usage; the others are the
/// boot keyboard and consumer control collections.
///
/// # Example
/// ```
/// use common::test_utils::create_mock_descriptor_list;
///
/// let devices = create_mock_descriptor_list(0x37a8, 0x0003, (0xFF00, 1));
/// assert_eq!(devices.len(), 3);
/// ```
pub fn create_mock_descriptor_list(
    vendor_id: u16,
    product_id: u16,
    vendor_usage: (u16, u16),
) -> Vec<DeviceDescriptor> {
    vec![
        create_mock_descriptor(vendor_id, product_id, 0x0001, 0x0006, "mock://if0"),
        create_mock_descriptor(vendor_id, product_id, 0x000C, 0x0001, "mock://if1"),
        create_mock_descriptor(
            vendor_id,
            product_id,
            vendor_usage.0,
            vendor_usage.1,
            "mock://if2",
        ),
    ]
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
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
