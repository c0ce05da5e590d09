//! # USB Printer Transport
//!
//! Talks to an ESC/POS receipt printer over USB bulk transfers with
//! `rusb` (libusb).
//!
//! ## Opening Sequence
//!
//! 1. Find the device by vendor/product id.
//! 2. If the kernel's `usblp` driver is bound to the interface, detach it.
//!    Hosts where libusb cannot introspect kernel drivers (macOS, Windows)
//!    report `NotSupported`; that is logged and ignored.
//! 3. Claim the interface.
//! 4. Find the bulk OUT endpoint in the active configuration descriptor,
//!    falling back to the profile's endpoint if the descriptor is unreadable.
//!
//! ## Permissions (Linux)
//!
//! ```bash
//! # /etc/udev/rules.d/99-receipt-printer.rules
//! SUBSYSTEM=="usb", ATTRS{idVendor}=="0416", ATTRS{idProduct}=="5011", MODE="0666"
//! ```
//!
//! ## Chunked Writes
//!
//! Data is written in 4096-byte bulk transfers, each retried until the
//! device has taken every byte or the transfer times out.

use std::time::Duration;

use rusb::{DeviceHandle, Direction, GlobalContext, TransferType};
use tracing::{debug, info, warn};

use super::device::{DeviceOpener, PrinterDevice};
use crate::error::ReceiptError;
use crate::printer::config::PrinterProfile;
use crate::protocol::graphics::ImageEncoding;

/// Bulk transfer size (bytes)
const CHUNK_SIZE: usize = 4096;

/// Per-transfer timeout
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// An open, claimed USB printer.
pub struct UsbPrinter {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
    endpoint: u8,
    capabilities: Vec<ImageEncoding>,
    timeout: Duration,
}

impl UsbPrinter {
    /// Open and claim the printer described by `profile`.
    ///
    /// ## Errors
    ///
    /// Returns [`ReceiptError::Device`] if:
    /// - No device with the vendor/product id is attached
    /// - Kernel driver detach fails (other than `NotSupported`)
    /// - The interface cannot be claimed (busy, permission denied)
    pub fn open(profile: &PrinterProfile) -> Result<Self, ReceiptError> {
        let handle = rusb::open_device_with_vid_pid(profile.vendor_id, profile.product_id)
            .ok_or_else(|| {
                ReceiptError::Device(format!(
                    "No USB printer {:04x}:{:04x} found (or permission denied)",
                    profile.vendor_id, profile.product_id
                ))
            })?;

        detach_kernel_driver(&handle, profile.interface)?;

        handle.claim_interface(profile.interface).map_err(|e| {
            ReceiptError::Device(format!(
                "Failed to claim interface {}: {}",
                profile.interface, e
            ))
        })?;

        let endpoint = find_bulk_out_endpoint(&handle, profile.interface).unwrap_or_else(|| {
            debug!(
                endpoint = profile.out_endpoint,
                "No bulk OUT endpoint in descriptor, using profile endpoint"
            );
            profile.out_endpoint
        });

        info!(
            printer = %profile.name,
            usb_id = %format!("{:04x}:{:04x}", profile.vendor_id, profile.product_id),
            endpoint,
            "Opened USB printer"
        );

        Ok(Self {
            handle,
            interface: profile.interface,
            endpoint,
            capabilities: profile.encodings.clone(),
            timeout: WRITE_TIMEOUT,
        })
    }
}

impl PrinterDevice for UsbPrinter {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), ReceiptError> {
        for chunk in data.chunks(CHUNK_SIZE) {
            let mut sent = 0;
            while sent < chunk.len() {
                let n = self
                    .handle
                    .write_bulk(self.endpoint, &chunk[sent..], self.timeout)
                    .map_err(|e| ReceiptError::Device(format!("Bulk write failed: {}", e)))?;
                if n == 0 {
                    return Err(ReceiptError::Device(
                        "Bulk write accepted no data".to_string(),
                    ));
                }
                sent += n;
            }
        }
        Ok(())
    }

    fn capabilities(&self) -> &[ImageEncoding] {
        &self.capabilities
    }
}

impl Drop for UsbPrinter {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            debug!(error = %e, "Failed to release USB interface");
        }
    }
}

/// Opens [`UsbPrinter`]s for a fixed profile.
#[derive(Debug, Clone)]
pub struct UsbOpener {
    profile: PrinterProfile,
}

impl UsbOpener {
    pub fn new(profile: PrinterProfile) -> Self {
        Self { profile }
    }
}

impl DeviceOpener for UsbOpener {
    fn open(&self) -> Result<Box<dyn PrinterDevice>, ReceiptError> {
        Ok(Box::new(UsbPrinter::open(&self.profile)?))
    }
}

/// Detach the kernel driver from `interface` if one is bound.
fn detach_kernel_driver(
    handle: &DeviceHandle<GlobalContext>,
    interface: u8,
) -> Result<(), ReceiptError> {
    match handle.kernel_driver_active(interface) {
        Ok(true) => {
            handle.detach_kernel_driver(interface).map_err(|e| {
                ReceiptError::Device(format!("Failed to detach kernel driver: {}", e))
            })?;
            info!(interface, "Detached kernel driver from printer interface");
        }
        Ok(false) => {}
        Err(rusb::Error::NotSupported) => {
            debug!("Kernel driver introspection not supported on this host");
        }
        Err(e) => {
            warn!(error = %e, "Could not query kernel driver state, continuing");
        }
    }
    Ok(())
}

/// Find the first bulk OUT endpoint on `interface` in the active configuration.
fn find_bulk_out_endpoint(handle: &DeviceHandle<GlobalContext>, interface: u8) -> Option<u8> {
    let config = handle.device().active_config_descriptor().ok()?;
    config
        .interfaces()
        .filter(|iface| iface.number() == interface)
        .flat_map(|iface| iface.descriptors())
        .flat_map(|desc| desc.endpoint_descriptors().collect::<Vec<_>>())
        .find(|ep| ep.direction() == Direction::Out && ep.transfer_type() == TransferType::Bulk)
        .map(|ep| ep.address())
}
