// Feetech STS3215 serial protocol implementation
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Status reply:  [0xFF, 0xFF, ID, Length, Error, Params..., Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

use super::codec;

/// Default serial configuration for Feetech motors
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Present_Current LSB in milliamps
pub const CURRENT_UNIT_MA: f64 = 6.5;

/// Broadcast ID (sync write, no status reply)
pub const BROADCAST_ID: u8 = 0xFE;

/// Alarm bits of the status byte
pub const ALARM_OVERCURRENT: u8 = 1 << 3;
pub const ALARM_OVERLOAD: u8 = 1 << 5;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register addresses for STS3215
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // RAM area (volatile)
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalVelocity = 46,    // 2 bytes (sign-magnitude, velocity mode)
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
    PresentCurrent = 69,  // 2 bytes, read-only (sign-magnitude, 6.5 mA/LSB)
}

/// Operating modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
    Step = 3,
}

/// Error types for Feetech communication
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Status reply from a motor
///
/// Alarm bits report the motor's condition; the instruction itself was still
/// executed, so the parameters are valid even when `alarms` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub id: u8,
    pub alarms: u8,
    pub params: Vec<u8>,
}

impl StatusPacket {
    /// Over-current or overload protection is active
    pub fn overloaded(&self) -> bool {
        self.alarms & (ALARM_OVERCURRENT | ALARM_OVERLOAD) != 0
    }
}

/// Feetech motor bus - handles serial communication with motors
pub struct FeetechBus {
    port: Box<dyn SerialPort>,
}

impl FeetechBus {
    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u32 = data.iter().map(|&b| b as u32).sum();
        !(sum as u8)
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum = Self::checksum(&packet[2..]);
        packet.push(checksum);

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        // Drop stale bytes from a previous timed-out exchange
        self.port.clear(serialport::ClearBuffer::Input)?;
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], id: u8) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id }
            } else {
                FeetechError::Io(e)
            }
        })
    }

    /// Read a status packet; alarm bits are logged, not treated as errors
    fn read_response(&mut self, expected_id: u8) -> Result<StatusPacket> {
        let mut header = [0u8; 2];
        self.read_exact(&mut header, expected_id)?;

        if header != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.read_exact(&mut id_length, expected_id)?;
        let [id, length] = id_length;

        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length field too short: {}", length),
            });
        }

        // error + params + checksum
        let mut remaining = vec![0u8; length as usize];
        self.read_exact(&mut remaining, id)?;

        let status = Self::parse_status(id, length, &remaining)?;
        if status.overloaded() {
            warn!("Motor {} over-current/overload alarm (status 0x{:02X})", id, status.alarms);
        } else if status.alarms != 0 {
            warn!("Motor {} reports alarm status 0x{:02X}", id, status.alarms);
        }
        Ok(status)
    }

    /// Decode the bytes after ID and length: error, params, checksum
    fn parse_status(id: u8, length: u8, remaining: &[u8]) -> Result<StatusPacket> {
        let Some((&received_checksum, body)) = remaining.split_last() else {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: "Empty status packet".to_string(),
            });
        };
        let Some((&alarms, params)) = body.split_first() else {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: "Missing error byte".to_string(),
            });
        };

        let mut checksum_data = vec![id, length];
        checksum_data.extend_from_slice(body);
        if Self::checksum(&checksum_data) != received_checksum {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        Ok(StatusPacket {
            id,
            alarms,
            params: params.to_vec(),
        })
    }

    /// Ping a motor to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write u8 to motor {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        self.read_response(id)?;
        Ok(())
    }

    /// Write two bytes (little-endian) to a register
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, lo, hi]);
        debug!("Write u16 to motor {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        self.read_response(id)?;
        Ok(())
    }

    /// Read two bytes (little-endian) from a register
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let packet = Self::build_packet(id, Instruction::Read, &[register as u8, 2]);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        match response.params.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            params => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", params.len()),
            }),
        }
    }

    /// Sync write: write the same 2-byte register on several motors with one packet
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // [start_addr, data_length, id1, lo1, hi1, id2, lo2, hi2, ...]
        let mut params = Vec::with_capacity(2 + 3 * data.len());
        params.extend_from_slice(&[register as u8, 2]);
        for &(id, value) in data {
            params.push(id);
            params.extend_from_slice(&value.to_le_bytes());
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!("Sync write to {} motors: reg={:?}", data.len(), register);
        self.send_packet(&packet)
    }

    // === High-level convenience methods ===

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Set operating mode (torque must be disabled first)
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Set goal velocity in raw steps/s (velocity mode)
    pub fn set_velocity(&mut self, id: u8, raw: i32) -> Result<()> {
        self.write_u16(id, Register::GoalVelocity, codec::to_sign_magnitude(raw))
    }

    /// Goal velocities for several motors in one packet
    pub fn sync_set_velocity(&mut self, data: &[(u8, i32)]) -> Result<()> {
        let encoded: Vec<(u8, u16)> = data
            .iter()
            .map(|&(id, raw)| (id, codec::to_sign_magnitude(raw)))
            .collect();
        self.sync_write_u16(Register::GoalVelocity, &encoded)
    }

    /// Present current magnitude in milliamps
    ///
    /// Still returns a reading while the motor flags over-current or overload,
    /// since that is exactly when the caller needs it.
    pub fn get_current(&mut self, id: u8) -> Result<f64> {
        let wire = self.read_u16(id, Register::PresentCurrent)?;
        Ok(Self::current_ma(wire))
    }

    fn current_ma(wire: u16) -> f64 {
        codec::from_sign_magnitude(wire).unsigned_abs() as f64 * CURRENT_UNIT_MA
    }
}
