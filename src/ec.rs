// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! CrOS embedded controller command channel.
//!
//! Every exchange with the EC is one fixed-size frame: a five-field
//! little-endian header followed by a 256-byte payload buffer. The driver
//! reads the whole frame, runs the command, and writes the header and any
//! response payload back into the same buffer. This module owns that wire
//! contract; how the frame physically reaches the EC is behind
//! [`EcTransport`], with a `/dev/cros_ec` ioctl adapter for real hardware
//! and a scripted in-memory adapter for tests.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Payload capacity per command, matching the driver's buffer.
pub const EC_CMD_MAX_REQUEST: usize = 0x100;

/// Header: version, command, outsize, insize, result -- five u32s.
pub const HEADER_LEN: usize = 20;

/// Total frame size on the wire.
pub const FRAME_LEN: usize = HEADER_LEN + EC_CMD_MAX_REQUEST;

/// Placed in `result` before the exchange; the EC overwrites it with its
/// own status, so seeing it back means the command never ran.
const RESULT_SENTINEL: u32 = 0xFF;

// EC command opcodes used by the fan pipeline.
pub const EC_CMD_PWM_SET_FAN_DUTY: u32 = 0x24;
pub const EC_CMD_THERMAL_AUTO_FAN_CTRL: u32 = 0x52;

/// Default character device exposed by the cros_ec kernel driver.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/cros_ec";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EcError {
    /// The EC device node could not be opened. Fatal at startup.
    #[error("failed to open EC device {path}: {source}")]
    DeviceOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The exchange itself failed at the OS/driver level. After this the
    /// channel's state is unknown.
    #[error("EC transport exchange failed: {0}")]
    Transport(#[source] io::Error),

    /// The EC answered but reported a non-zero status. What a given code
    /// means is command-specific, so callers must not blindly retry.
    #[error("EC reported error code {0}")]
    Command(u32),

    /// The channel was closed and can no longer issue commands.
    #[error("EC channel used after close")]
    Closed,
}

// ---------------------------------------------------------------------------
// Frame codec
// ---------------------------------------------------------------------------

/// One request/response frame, in decoded form.
#[derive(Debug, Clone)]
pub struct CommandFrame {
    pub version: u32,
    pub command: u32,
    pub outsize: u32,
    pub insize: u32,
    pub result: u32,
    pub data: [u8; EC_CMD_MAX_REQUEST],
}

impl CommandFrame {
    /// Build a request frame. `payload` is copied to the front of the data
    /// buffer; `insize` always advertises the full buffer so the EC may
    /// write back as much as it wants.
    pub fn request(command: u32, payload: &[u8], version: u32) -> Self {
        let outsize = payload.len().min(EC_CMD_MAX_REQUEST);
        let mut data = [0u8; EC_CMD_MAX_REQUEST];
        data[..outsize].copy_from_slice(&payload[..outsize]);

        Self {
            version,
            command,
            outsize: outsize as u32,
            insize: EC_CMD_MAX_REQUEST as u32,
            result: RESULT_SENTINEL,
            data,
        }
    }

    /// Pack into wire form: header fields in order, little-endian, then the
    /// payload buffer.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0..4].copy_from_slice(&self.version.to_le_bytes());
        buf[4..8].copy_from_slice(&self.command.to_le_bytes());
        buf[8..12].copy_from_slice(&self.outsize.to_le_bytes());
        buf[12..16].copy_from_slice(&self.insize.to_le_bytes());
        buf[16..20].copy_from_slice(&self.result.to_le_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.data);
        buf
    }

    /// Decode a frame the driver wrote back.
    pub fn decode(buf: &[u8; FRAME_LEN]) -> Self {
        let field = |i: usize| {
            u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap())
        };
        let mut data = [0u8; EC_CMD_MAX_REQUEST];
        data.copy_from_slice(&buf[HEADER_LEN..]);

        Self {
            version: field(0),
            command: field(1),
            outsize: field(2),
            insize: field(3),
            result: field(4),
            data,
        }
    }

    /// Extract the response payload given the byte count the driver
    /// reported. Anything beyond the header is payload, clamped to the
    /// buffer; zero bytes back is an empty response, not an error.
    pub fn response_payload(&self, bytes_returned: usize) -> Vec<u8> {
        let len = bytes_returned
            .saturating_sub(HEADER_LEN)
            .min(EC_CMD_MAX_REQUEST);
        self.data[..len].to_vec()
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Submit one encoded frame and receive the driver's answer in place.
///
/// Returns the number of frame bytes the driver wrote back (header plus
/// response payload). The call blocks until the EC answers or the driver
/// reports a failure; a submitted command is never cancelled midway.
pub trait EcTransport {
    fn exchange(&mut self, frame: &mut [u8; FRAME_LEN]) -> Result<usize, EcError>;
}

mod sys {
    use nix::ioctl_readwrite;

    const CROS_EC_DEV_IOC: u8 = 0xEC;

    /// Header fields exactly as the kernel declares `struct
    /// cros_ec_command`. The chardev exact-matches the ioctl request code,
    /// whose size field must cover this struct alone; the payload that
    /// follows it in memory is sized by `outsize`/`insize`, not by the
    /// request code.
    #[repr(C)]
    #[derive(Default)]
    pub struct CrosEcCommandHeader {
        pub version: u32,
        pub command: u32,
        pub outsize: u32,
        pub insize: u32,
        pub result: u32,
    }

    /// Full in-memory layout handed to the driver: header, then the
    /// payload buffer the kernel copies into and out of.
    #[repr(C)]
    pub struct CrosEcCommandBuf {
        pub header: CrosEcCommandHeader,
        pub data: [u8; super::EC_CMD_MAX_REQUEST],
    }

    ioctl_readwrite!(cros_ec_xcmd, CROS_EC_DEV_IOC, 0, CrosEcCommandHeader);
}

/// Real hardware adapter over the cros_ec character device.
///
/// The handle is held exclusively for the life of the adapter, which keeps
/// the at-most-one-command-in-flight rule a matter of ownership rather than
/// locking.
pub struct CrosEcDevice {
    file: File,
}

impl CrosEcDevice {
    /// Open the device node read-write. Fails fast if the node is absent,
    /// which is the expected failure on machines without the driver.
    pub fn open(path: &Path) -> Result<Self, EcError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| EcError::DeviceOpen {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { file })
    }
}

impl EcTransport for CrosEcDevice {
    fn exchange(&mut self, frame: &mut [u8; FRAME_LEN]) -> Result<usize, EcError> {
        // Stage the frame in the kernel's own layout, which gives the
        // pointer the alignment the header struct requires and keeps the
        // wire codec endian-explicit on the way in and out.
        let request = CommandFrame::decode(frame);
        let mut buf = sys::CrosEcCommandBuf {
            header: sys::CrosEcCommandHeader {
                version: request.version,
                command: request.command,
                outsize: request.outsize,
                insize: request.insize,
                result: request.result,
            },
            data: request.data,
        };

        // The ioctl return value counts response payload bytes; the header
        // is always rewritten, so report it as part of the frame bytes.
        let cmd = (&raw mut buf).cast::<sys::CrosEcCommandHeader>();
        let n = unsafe { sys::cros_ec_xcmd(self.file.as_raw_fd(), cmd) }
            .map_err(|errno| EcError::Transport(io::Error::from_raw_os_error(errno as i32)))?;

        let reply = CommandFrame {
            version: buf.header.version,
            command: buf.header.command,
            outsize: buf.header.outsize,
            insize: buf.header.insize,
            result: buf.header.result,
            data: buf.data,
        };
        *frame = reply.encode();
        Ok(HEADER_LEN + n as usize)
    }
}

/// In-memory transport that records submitted frames and answers from a
/// script. Stands in for hardware in the test suite and in bring-up
/// debugging. Clones share the same recording and script, so a caller can
/// keep a handle after moving the transport into a channel.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    sent: Arc<Mutex<Vec<CommandFrame>>>,
    script: Arc<Mutex<Vec<(u32, Vec<u8>, usize)>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response carrying `payload`.
    pub fn respond_ok(&self, payload: &[u8]) {
        self.script
            .lock()
            .unwrap()
            .push((0, payload.to_vec(), HEADER_LEN + payload.len()));
    }

    /// Queue a response with a non-zero EC result code.
    pub fn respond_err(&self, result: u32) {
        self.script.lock().unwrap().push((result, Vec::new(), HEADER_LEN));
    }

    /// Queue a raw response: result code, payload, reported byte count.
    pub fn respond_raw(&self, result: u32, payload: Vec<u8>, bytes_returned: usize) {
        self.script.lock().unwrap().push((result, payload, bytes_returned));
    }

    /// Every frame submitted so far, in decoded form, oldest first.
    pub fn sent(&self) -> Vec<CommandFrame> {
        self.sent.lock().unwrap().clone()
    }
}

impl EcTransport for ScriptedTransport {
    fn exchange(&mut self, frame: &mut [u8; FRAME_LEN]) -> Result<usize, EcError> {
        let request = CommandFrame::decode(frame);

        // With no script, echo the request payload back unchanged.
        let mut script = self.script.lock().unwrap();
        let (result, payload, bytes_returned) = if script.is_empty() {
            let echoed = request.data[..request.outsize as usize].to_vec();
            let n = HEADER_LEN + echoed.len();
            (0, echoed, n)
        } else {
            script.remove(0)
        };
        drop(script);
        self.sent.lock().unwrap().push(request.clone());

        let mut reply = request;
        reply.result = result;
        reply.data = [0u8; EC_CMD_MAX_REQUEST];
        let len = payload.len().min(EC_CMD_MAX_REQUEST);
        reply.data[..len].copy_from_slice(&payload[..len]);
        *frame = reply.encode();
        Ok(bytes_returned)
    }
}

// ---------------------------------------------------------------------------
// Command channel
// ---------------------------------------------------------------------------

/// One command-at-a-time client over an exclusive transport handle.
pub struct EcCommandChannel<T: EcTransport> {
    transport: Option<T>,
}

impl EcCommandChannel<CrosEcDevice> {
    /// Open a channel over the real device node.
    pub fn open_device(path: &Path) -> Result<Self, EcError> {
        Ok(Self::new(CrosEcDevice::open(path)?))
    }
}

impl<T: EcTransport> EcCommandChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// Send `command` with a byte payload and return the response payload.
    ///
    /// `outsize` is clamped to the payload length; the EC sees exactly the
    /// bytes the caller provided, zero-padded to the buffer.
    pub fn send_command_sized(
        &mut self,
        command: u32,
        payload: &[u8],
        outsize: usize,
        version: u32,
    ) -> Result<Vec<u8>, EcError> {
        let transport = self.transport.as_mut().ok_or(EcError::Closed)?;

        let outsize = outsize.min(payload.len());
        let frame = CommandFrame::request(command, &payload[..outsize], version);

        let mut buf = frame.encode();
        let bytes_returned = transport.exchange(&mut buf)?;

        let reply = CommandFrame::decode(&buf);
        if reply.result != 0 {
            return Err(EcError::Command(reply.result));
        }
        Ok(reply.response_payload(bytes_returned))
    }

    /// Send `command` with the whole payload slice.
    pub fn send_command(
        &mut self,
        command: u32,
        payload: &[u8],
        version: u32,
    ) -> Result<Vec<u8>, EcError> {
        self.send_command_sized(command, payload, payload.len(), version)
    }

    /// Send a command whose payload is a single u32, little-endian.
    pub fn send_command_u32(&mut self, command: u32, value: u32) -> Result<Vec<u8>, EcError> {
        self.send_command(command, &value.to_le_bytes(), 0)
    }

    /// Send a command whose payload is a single boolean byte.
    pub fn send_command_bool(&mut self, command: u32, value: bool) -> Result<Vec<u8>, EcError> {
        self.send_command(command, &[u8::from(value)], 0)
    }

    /// Drop the transport handle. Further calls fail with [`EcError::Closed`].
    pub fn close(&mut self) {
        self.transport = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xcmd_request_code_covers_header_only() {
        // The kernel registers the command as _IOWR(0xEC, 0, struct
        // cros_ec_command) and exact-matches the code, so the size bits
        // must encode the 20-byte header rather than the full frame.
        assert_eq!(std::mem::size_of::<sys::CrosEcCommandHeader>(), HEADER_LEN);
        assert_eq!(
            std::mem::offset_of!(sys::CrosEcCommandBuf, data),
            HEADER_LEN
        );

        let code = nix::request_code_readwrite!(
            0xECu8,
            0,
            std::mem::size_of::<sys::CrosEcCommandHeader>()
        );
        assert_eq!(code as u64, 0xc014_ec00);
    }

    #[test]
    fn test_request_frame_layout() {
        let frame = CommandFrame::request(EC_CMD_PWM_SET_FAN_DUTY, &[0x2A, 0, 0, 0], 1);
        let buf = frame.encode();

        assert_eq!(buf.len(), FRAME_LEN);
        assert_eq!(&buf[0..4], &1u32.to_le_bytes()); // version
        assert_eq!(&buf[4..8], &0x24u32.to_le_bytes()); // command
        assert_eq!(&buf[8..12], &4u32.to_le_bytes()); // outsize
        assert_eq!(&buf[12..16], &256u32.to_le_bytes()); // insize
        assert_eq!(&buf[16..20], &0xFFu32.to_le_bytes()); // result sentinel
        assert_eq!(buf[20], 0x2A);
        assert!(buf[24..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_inverts_encode() {
        let frame = CommandFrame::request(0x52, &[1, 2, 3], 0);
        let decoded = CommandFrame::decode(&frame.encode());
        assert_eq!(decoded.command, 0x52);
        assert_eq!(decoded.outsize, 3);
        assert_eq!(decoded.data[..3], [1, 2, 3]);
    }

    #[test]
    fn test_echo_round_trip() {
        let mut channel = EcCommandChannel::new(ScriptedTransport::new());
        let payload = [7u8, 8, 9];

        let response = channel.send_command(0x21, &payload, 0).unwrap();
        assert_eq!(response, payload);
    }

    #[test]
    fn test_outsize_clamped_to_payload() {
        let transport = ScriptedTransport::new();
        let mut channel = EcCommandChannel::new(transport.clone());
        channel.send_command_sized(0x24, &[5, 6], 10, 0).unwrap();

        assert_eq!(transport.sent()[0].outsize, 2);
    }

    #[test]
    fn test_nonzero_result_is_a_command_error() {
        let transport = ScriptedTransport::new();
        transport.respond_err(3);
        let mut channel = EcCommandChannel::new(transport);

        match channel.send_command_u32(EC_CMD_PWM_SET_FAN_DUTY, 40) {
            Err(EcError::Command(3)) => {}
            other => panic!("expected EC error code 3, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_bytes_returned_is_an_empty_response() {
        let transport = ScriptedTransport::new();
        transport.respond_raw(0, Vec::new(), 0);
        let mut channel = EcCommandChannel::new(transport);

        let response = channel.send_command(0x52, &[0], 0).unwrap();
        assert!(response.is_empty());
    }

    #[test]
    fn test_scripted_response_payload_is_returned() {
        let transport = ScriptedTransport::new();
        transport.respond_ok(&[0xAA, 0xBB]);
        let mut channel = EcCommandChannel::new(transport);

        let response = channel.send_command(0x21, &[], 0).unwrap();
        assert_eq!(response, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_bool_and_u32_payloads() {
        let transport = ScriptedTransport::new();
        let mut channel = EcCommandChannel::new(transport.clone());

        channel.send_command_bool(0x52, false).unwrap();
        channel.send_command_u32(0x24, 0x01020304).unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].data[..1], [0]);
        assert_eq!(sent[0].outsize, 1);
        assert_eq!(sent[1].data[..4], [4, 3, 2, 1]);
        assert_eq!(sent[1].outsize, 4);
    }

    #[test]
    fn test_closed_channel_rejects_commands() {
        let mut channel = EcCommandChannel::new(ScriptedTransport::new());
        channel.close();

        assert!(matches!(
            channel.send_command(0x24, &[0], 0),
            Err(EcError::Closed)
        ));
    }
}
