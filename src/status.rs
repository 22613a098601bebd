//! Master-mode status codes reported in TWSR
//!
//! After every bus operation the peripheral reports what happened through the upper five bits
//! of TWSR. The lower bits hold the bit-rate prescaler and are ignored when decoding.

use crate::hw_traits::twi::TwiPeriph;
use crate::i2c::I2cError;

/// Significant TWSR bits (TWS7:3)
pub const TWSR_STATUS_MASK: u8 = 0xF8;

/// Condition reported by the peripheral after a start, address or data phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusCode {
    /// A start condition has been transmitted
    Start,
    /// A repeated start condition has been transmitted
    RepeatedStart,
    /// SLA+W has been transmitted, ACK received
    SlaWriteAck,
    /// SLA+W has been transmitted, NACK received
    SlaWriteNack,
    /// Data byte has been transmitted, ACK received
    DataTransmittedAck,
    /// Data byte has been transmitted, NACK received
    DataTransmittedNack,
    /// Arbitration lost in SLA+R/W or data bytes
    ArbitrationLost,
    /// SLA+R has been transmitted, ACK received
    SlaReadAck,
    /// SLA+R has been transmitted, NACK received
    SlaReadNack,
    /// Data byte has been received, ACK returned
    DataReceivedAck,
    /// Data byte has been received, NACK returned
    DataReceivedNack,
    /// Any other status, e.g. idle (0xF8), bus error (0x00) or a slave-mode code.
    /// Holds the masked status bits.
    Unrecognized(u8),
}

impl StatusCode {
    /// Decode a raw TWSR value. Prescaler bits are masked off first.
    pub const fn from_twsr(twsr: u8) -> Self {
        match twsr & TWSR_STATUS_MASK {
            0x08 => StatusCode::Start,
            0x10 => StatusCode::RepeatedStart,
            0x18 => StatusCode::SlaWriteAck,
            0x20 => StatusCode::SlaWriteNack,
            0x28 => StatusCode::DataTransmittedAck,
            0x30 => StatusCode::DataTransmittedNack,
            0x38 => StatusCode::ArbitrationLost,
            0x40 => StatusCode::SlaReadAck,
            0x48 => StatusCode::SlaReadNack,
            0x50 => StatusCode::DataReceivedAck,
            0x58 => StatusCode::DataReceivedNack,
            other => StatusCode::Unrecognized(other),
        }
    }

    /// The status bits as they appear in TWSR with a zero prescaler
    pub const fn bits(self) -> u8 {
        match self {
            StatusCode::Start => 0x08,
            StatusCode::RepeatedStart => 0x10,
            StatusCode::SlaWriteAck => 0x18,
            StatusCode::SlaWriteNack => 0x20,
            StatusCode::DataTransmittedAck => 0x28,
            StatusCode::DataTransmittedNack => 0x30,
            StatusCode::ArbitrationLost => 0x38,
            StatusCode::SlaReadAck => 0x40,
            StatusCode::SlaReadNack => 0x48,
            StatusCode::DataReceivedAck => 0x50,
            StatusCode::DataReceivedNack => 0x58,
            StatusCode::Unrecognized(bits) => bits,
        }
    }

    /// Whether the addressed slave answered the address byte with a NACK
    #[inline]
    pub fn is_address_nack(self) -> bool {
        matches!(self, StatusCode::SlaWriteNack | StatusCode::SlaReadNack)
    }

    /// Whether the receiver answered a transmitted data byte with a NACK
    #[inline]
    pub fn is_data_nack(self) -> bool {
        matches!(self, StatusCode::DataTransmittedNack)
    }
}

impl From<u8> for StatusCode {
    #[inline]
    fn from(twsr: u8) -> Self {
        StatusCode::from_twsr(twsr)
    }
}

impl From<StatusCode> for u8 {
    #[inline]
    fn from(status: StatusCode) -> u8 {
        status.bits()
    }
}

// Compares the status currently held in TWSR with the one the finished phase requires
#[inline]
pub(crate) fn check<TWI: TwiPeriph>(twi: &TWI, expected: StatusCode) -> Result<(), I2cError> {
    let actual = StatusCode::from_twsr(twi.twsr_rd());
    if actual == expected {
        Ok(())
    } else {
        Err(I2cError::UnexpectedStatus { expected, actual })
    }
}
