//! # Frame sinks: the hardware serial port and its simulated stand-in.
//!
//! [`FrameSink`] is the seam between the queue and the device. The contract
//! mirrors the bus requirements: `write_packet` must not return until the
//! bytes are flushed to the device ("drain after write"), so the writer task
//! can pace the inter-packet gap from the true end of transmission.
//!
//! Two implementations:
//! - [`SerialSink`] — a `serialport` device, 8-N-1 without flow control.
//!   Writes are small (a dozen bytes) and the writer task is the only caller,
//!   so the blocking write+flush runs inline on the writer.
//! - [`SimSink`] — acknowledges after a token delay and never fails; used in
//!   simulation mode and by the test suite. Observers still see every frame.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LightResult;

/// Default token latency of the simulated sink.
pub const SIM_ACK_DELAY: Duration = Duration::from_millis(5);

/// Write endpoint for wire packets.
#[async_trait]
pub trait FrameSink: Send {
    /// Short description for logs ("serial:/dev/ttyUSB0@38400", "sim").
    fn describe(&self) -> String;

    /// Opens (or reopens) the endpoint. Idempotent when already open.
    async fn open(&mut self) -> LightResult<()>;

    /// Writes one complete wire packet and flushes it to the device.
    ///
    /// Must not return before the bytes have drained; the queue paces the
    /// inter-packet gap from this return.
    async fn write_packet(&mut self, bytes: &[u8]) -> LightResult<()>;

    /// Closes the endpoint. Further writes require `open` again.
    async fn close(&mut self);

    /// True when this sink never touches hardware.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Hardware sink over a `serialport` device.
pub struct SerialSink {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialSink {
    /// Creates a sink for the given device path and line speed.
    ///
    /// The port is not opened until [`FrameSink::open`] is called, so the
    /// transport owns the full lifecycle including reconnects.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }
}

#[async_trait]
impl FrameSink for SerialSink {
    fn describe(&self) -> String {
        format!("serial:{}@{}", self.path, self.baud_rate)
    }

    async fn open(&mut self) -> LightResult<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_secs(2))
            .open()?;
        self.port = Some(port);
        Ok(())
    }

    async fn write_packet(&mut self, bytes: &[u8]) -> LightResult<()> {
        use std::io::Write;

        let port = self.port.as_mut().ok_or(crate::error::LightError::TransportIo {
            reason: "port not open".to_string(),
        })?;
        let result = port.write_all(bytes).and_then(|()| port.flush());
        if let Err(e) = result {
            // A failed port is not reusable; drop it so reopen starts clean.
            self.port = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.port = None;
    }
}

/// Simulated sink: acknowledges after [`SIM_ACK_DELAY`], never fails.
pub struct SimSink {
    latency: Duration,
    open: bool,
}

impl SimSink {
    /// Creates a sink with the default token latency.
    pub fn new() -> Self {
        Self::with_latency(SIM_ACK_DELAY)
    }

    /// Creates a sink with a custom latency (tests use zero).
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            open: false,
        }
    }
}

impl Default for SimSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSink for SimSink {
    fn describe(&self) -> String {
        "sim".to_string()
    }

    async fn open(&mut self) -> LightResult<()> {
        self.open = true;
        Ok(())
    }

    async fn write_packet(&mut self, _bytes: &[u8]) -> LightResult<()> {
        if self.latency > Duration::ZERO {
            tokio::time::sleep(self.latency).await;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
    }

    fn is_simulated(&self) -> bool {
        true
    }
}
