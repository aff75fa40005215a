//! FTMS (Fitness Machine Service) wire protocol.
//!
//! Control point command encoding, control point response decoding, and
//! Indoor Bike Data notification decoding.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ftms::types::ProtocolError;

/// FTMS Service UUID (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5f9b_34fb);

/// Indoor Bike Data Characteristic UUID (0x2AD2)
pub const INDOOR_BIKE_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2ad2_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Control Point UUID (0x2AD9)
pub const FTMS_CONTROL_POINT_UUID: Uuid =
    Uuid::from_u128(0x0000_2ad9_0000_1000_8000_0080_5f9b_34fb);

/// Control point opcodes used by this core.
pub mod opcode {
    /// Request control of the fitness machine
    pub const REQUEST_CONTROL: u8 = 0x00;
    /// Set target power (ERG mode)
    pub const SET_TARGET_POWER: u8 = 0x05;
    /// Start or resume training
    pub const START: u8 = 0x07;
    /// Stop or pause training
    pub const STOP: u8 = 0x08;
}

/// First byte of every control point response notification.
pub const RESPONSE_MARKER: u8 = 0x80;

/// Result code for a successful control point request.
pub const RESULT_SUCCESS: u8 = 0x01;

/// Indoor Bike Data flag: instantaneous speed field present (bit 2).
const FLAG_SPEED_PRESENT: u16 = 0x0004;

/// Indoor Bike Data flag: instantaneous power field present (bit 6).
const FLAG_POWER_PRESENT: u16 = 0x0040;

/// A command written to the FTMS control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPointCommand {
    /// Request exclusive control of the machine
    RequestControl,
    /// Start or resume training
    Start,
    /// Stop training
    Stop,
    /// Set target power in watts (ERG mode)
    SetTargetPower(i16),
}

impl ControlPointCommand {
    /// The opcode byte for this command.
    pub fn opcode(&self) -> u8 {
        match self {
            ControlPointCommand::RequestControl => opcode::REQUEST_CONTROL,
            ControlPointCommand::Start => opcode::START,
            ControlPointCommand::Stop => opcode::STOP,
            ControlPointCommand::SetTargetPower(_) => opcode::SET_TARGET_POWER,
        }
    }

    /// Encode the command into a control point frame.
    ///
    /// `SetTargetPower` carries its wattage as a little-endian signed
    /// 16-bit payload; the other commands are a bare opcode.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ControlPointCommand::SetTargetPower(watts) => {
                let mut frame = vec![opcode::SET_TARGET_POWER];
                frame.extend_from_slice(&watts.to_le_bytes());
                frame
            }
            _ => vec![self.opcode()],
        }
    }
}

/// A decoded control point response notification.
///
/// Responses carry no request ID; they are correlated to the in-flight
/// request by the echoed opcode alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPointResponse {
    /// Opcode of the request this response answers
    pub request_opcode: u8,
    /// Machine result code (`0x01` = success)
    pub result_code: u8,
}

impl ControlPointResponse {
    /// Decode a response frame: `[0x80, request opcode, result code]`.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = FrameCursor::new(data);
        if cursor.u8()? != RESPONSE_MARKER {
            return Err(ProtocolError::MalformedNotification);
        }
        Ok(Self {
            request_opcode: cursor.u8()?,
            result_code: cursor.u8()?,
        })
    }

    /// Whether the machine granted the request.
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_SUCCESS
    }
}

/// A decoded Indoor Bike Data notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BikeDataSample {
    /// Raw presence flags from the frame header
    pub flags: u16,
    /// Instantaneous power in watts; `0` when the power field is absent
    pub power_watts: i16,
}

impl BikeDataSample {
    /// Decode an Indoor Bike Data frame.
    ///
    /// The frame is a variable-length record: a little-endian u16 flags
    /// header followed by optional fields whose presence is flag-bit
    /// driven. This core interprets only the speed flag (bit 2, skipped
    /// at its 2-byte width so later offsets stay valid) and the power
    /// flag (bit 6). Extending it to further fields means consulting the
    /// full FTMS flag table and skipping every preceding field at its
    /// declared width.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = FrameCursor::new(data);
        let flags = cursor.u16_le()?;

        if flags & FLAG_SPEED_PRESENT != 0 {
            cursor.skip(2)?;
        }

        let power_watts = if flags & FLAG_POWER_PRESENT != 0 {
            cursor.i16_le()?
        } else {
            0
        };

        Ok(Self { flags, power_watts })
    }
}

/// Byte cursor over a notification frame.
///
/// Advances strictly left-to-right by declared field widths, keeping the
/// flag-driven offset arithmetic explicit and auditable.
pub struct FrameCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FrameCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn field(&mut self, width: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .offset
            .checked_add(width)
            .ok_or(ProtocolError::MalformedNotification)?;
        let field = self
            .data
            .get(self.offset..end)
            .ok_or(ProtocolError::MalformedNotification)?;
        self.offset = end;
        Ok(field)
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.field(1)?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16, ProtocolError> {
        let field = self.field(2)?;
        Ok(u16::from_le_bytes([field[0], field[1]]))
    }

    pub fn i16_le(&mut self) -> Result<i16, ProtocolError> {
        let field = self.field(2)?;
        Ok(i16::from_le_bytes([field[0], field[1]]))
    }

    /// Skip an unused field, keeping subsequent offsets correct.
    pub fn skip(&mut self, width: usize) -> Result<(), ProtocolError> {
        self.field(width).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request_control() {
        assert_eq!(ControlPointCommand::RequestControl.encode(), vec![0x00]);
    }

    #[test]
    fn test_encode_start_and_stop() {
        assert_eq!(ControlPointCommand::Start.encode(), vec![0x07]);
        assert_eq!(ControlPointCommand::Stop.encode(), vec![0x08]);
    }

    #[test]
    fn test_encode_set_target_power() {
        // 250W = 0x00FA little-endian
        let frame = ControlPointCommand::SetTargetPower(250).encode();
        assert_eq!(frame, vec![0x05, 0xFA, 0x00]);
    }

    #[test]
    fn test_encode_set_target_power_negative() {
        // -100W = 0xFF9C little-endian
        let frame = ControlPointCommand::SetTargetPower(-100).encode();
        assert_eq!(frame, vec![0x05, 0x9C, 0xFF]);
    }

    #[test]
    fn test_set_target_power_payload_round_trip() {
        for watts in [i16::MIN, -1000, -1, 0, 1, 250, 1000, i16::MAX] {
            let frame = ControlPointCommand::SetTargetPower(watts).encode();
            assert_eq!(frame[0], 0x05);
            let decoded = i16::from_le_bytes([frame[1], frame[2]]);
            assert_eq!(decoded, watts);
        }
    }

    #[test]
    fn test_parse_response_success() {
        let response = ControlPointResponse::parse(&[0x80, 0x00, 0x01]).unwrap();
        assert_eq!(response.request_opcode, opcode::REQUEST_CONTROL);
        assert!(response.is_success());
    }

    #[test]
    fn test_parse_response_failure_code() {
        // Any result code other than 0x01 is a rejection
        let response = ControlPointResponse::parse(&[0x80, 0x00, 0x00]).unwrap();
        assert!(!response.is_success());

        let response = ControlPointResponse::parse(&[0x80, 0x05, 0x02]).unwrap();
        assert_eq!(response.request_opcode, opcode::SET_TARGET_POWER);
        assert!(!response.is_success());
    }

    #[test]
    fn test_parse_response_wrong_marker() {
        assert!(ControlPointResponse::parse(&[0x81, 0x00, 0x01]).is_err());
    }

    #[test]
    fn test_parse_response_too_short() {
        assert!(ControlPointResponse::parse(&[0x80, 0x00]).is_err());
        assert!(ControlPointResponse::parse(&[]).is_err());
    }

    #[test]
    fn test_parse_bike_data_power_only() {
        // Flags: 0x0040 (power present), power: 50W
        let sample = BikeDataSample::parse(&[0x40, 0x00, 0x32, 0x00]).unwrap();
        assert_eq!(sample.flags, 0x0040);
        assert_eq!(sample.power_watts, 50);
    }

    #[test]
    fn test_parse_bike_data_skips_speed_field() {
        // Flags: 0x0044 (speed + power), speed bytes skipped, power: 50W
        let sample = BikeDataSample::parse(&[0x44, 0x00, 0xAA, 0xBB, 0x32, 0x00]).unwrap();
        assert_eq!(sample.power_watts, 50);
    }

    #[test]
    fn test_parse_bike_data_no_power_flag() {
        // Flags: 0x0000, power field absent reads as 0
        let sample = BikeDataSample::parse(&[0x00, 0x00]).unwrap();
        assert_eq!(sample.power_watts, 0);
    }

    #[test]
    fn test_parse_bike_data_negative_power() {
        // -5W = 0xFFFB little-endian
        let sample = BikeDataSample::parse(&[0x40, 0x00, 0xFB, 0xFF]).unwrap();
        assert_eq!(sample.power_watts, -5);
    }

    #[test]
    fn test_parse_bike_data_truncated() {
        // Power flag set but only one payload byte
        assert!(BikeDataSample::parse(&[0x40, 0x00, 0x32]).is_err());
        // Speed flag set but no speed bytes
        assert!(BikeDataSample::parse(&[0x44, 0x00]).is_err());
        // Missing one flags byte
        assert!(BikeDataSample::parse(&[0x40]).is_err());
    }
}
