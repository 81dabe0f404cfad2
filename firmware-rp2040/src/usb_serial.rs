//! USB CDC ACM transport for the configuration protocol.

use defmt::Format;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::{Driver, EndpointError};
use embassy_usb::Builder;

/// Maximum packet size of the CDC data endpoints.
pub const MAX_PACKET_SIZE: usize = 64;

/// Error type for serial transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum SerialError {
    /// Host closed the port or the USB device was reset.
    Disconnected,
    /// Received packet larger than the read buffer.
    BufferOverflow,
}

impl From<EndpointError> for SerialError {
    fn from(e: EndpointError) -> Self {
        match e {
            EndpointError::BufferOverflow => SerialError::BufferOverflow,
            EndpointError::Disabled => SerialError::Disconnected,
        }
    }
}

/// Add a CDC ACM interface to the USB device.
pub fn configure_usb_cdc<'d, D: Driver<'d>>(
    builder: &mut Builder<'d, D>,
    state: &'d mut State<'d>,
) -> CdcAcmClass<'d, D> {
    CdcAcmClass::new(builder, state, MAX_PACKET_SIZE as u16)
}

/// Packet-oriented serial port over USB CDC ACM.
///
/// Each packet from the host is handed out as one chunk; the configurator
/// sends every token in its own write, so a chunk holds one or more whole
/// tokens.
pub struct UsbSerial<'d, D: Driver<'d>> {
    class: CdcAcmClass<'d, D>,
}

impl<'d, D: Driver<'d>> UsbSerial<'d, D> {
    /// Create a new serial port from a configured CDC ACM class.
    #[must_use]
    pub fn new(class: CdcAcmClass<'d, D>) -> Self {
        Self { class }
    }

    /// Wait until the host opens the port.
    pub async fn wait_connection(&mut self) {
        self.class.wait_connection().await;
    }

    /// Whether the host has the port open (DTR asserted).
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.class.dtr()
    }

    /// Read the next packet from the host.
    pub async fn read_chunk<'b>(
        &mut self,
        buf: &'b mut [u8; MAX_PACKET_SIZE],
    ) -> Result<&'b [u8], SerialError> {
        let n = self.class.read_packet(buf).await?;
        Ok(&buf[..n])
    }

    /// Write `data` as a sequence of packets.
    ///
    /// A transfer that ends on a full packet is terminated with a zero-length
    /// packet so the host sees it immediately.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError> {
        for chunk in data.chunks(MAX_PACKET_SIZE) {
            self.class.write_packet(chunk).await?;
        }
        if !data.is_empty() && data.len() % MAX_PACKET_SIZE == 0 {
            self.class.write_packet(&[]).await?;
        }
        Ok(())
    }
}
