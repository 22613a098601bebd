//! I2C
//!
//! The TWI peripheral can be used as a blocking two-wire bus master.
//!
//! Begin configuration by calling [`I2cConfig::new()`], optionally choose the bit rate and poll
//! limit, then call [`I2cConfig::configure()`] to write the bit-rate registers, enable the
//! peripheral and obtain an [`I2c`] handle.
//!
//! Pins used:
//!
//! ATmega328P: {SCL:PC5, SDA:PC4}
//!
//! ATmega32U4: {SCL:PD0, SDA:PD1}
//!
//! ATmega2560: {SCL:PD0, SDA:PD1}
//!
//! Every bus operation is a fixed sequence of start, address, data and stop phases. After each
//! phase the status reported in TWSR is compared with the code expected for that phase, and the
//! first mismatch aborts the transaction. A stop condition ends every transaction, whether it
//! succeeded or not. Nothing is retried.
//!
//! Besides the register-oriented inherent methods, [`I2c`] implements [`embedded_hal`]'s
//! [`I2c`](embedded_hal::i2c::I2c) trait and, with the `embedded-hal-02` feature, the blocking
//! I2C traits of embedded-hal 0.2.

use crate::hw_traits::twi::{Twcr, TwiPeriph, Twps};
use crate::status::{self, StatusCode};
use core::convert::Infallible;
use core::num::NonZeroU32;
use embedded_hal::i2c::Operation;

/// Fewest completion-flag polls allowed per bus phase before it is reported as
/// [`I2cError::Timeout`], unless [`I2cConfig::poll_limit()`] says otherwise
pub const DEFAULT_POLL_LIMIT: u32 = 20_000;

// Address or data byte plus the acknowledge bit
const PHASE_BITS: u32 = 9;
// Headroom over one phase worth of CPU cycles, for clock stretching
const POLL_MARGIN: u32 = 4;

/// First 7-bit address probed by [`I2c::scan()`]. Lower addresses are reserved.
pub const FIRST_ADDRESS: u8 = 0x08;
/// Last 7-bit address probed by [`I2c::scan()`]. Higher addresses are reserved.
pub const LAST_ADDRESS: u8 = 0x77;

/// Marks a peripheral capable of TWI master mode
pub trait TwiBus: TwiPeriph {}

#[cfg(feature = "device")]
impl TwiBus for crate::pac::TWI {}

/// Bit-rate prescaler. SCL frequency = CPU frequency / (16 + 2 * divisor * prescaler)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    /// Divide by 1
    Div1,
    /// Divide by 4
    Div4,
    /// Divide by 16
    Div16,
    /// Divide by 64
    Div64,
}

impl Prescaler {
    const ALL: [Prescaler; 4] = [
        Prescaler::Div1,
        Prescaler::Div4,
        Prescaler::Div16,
        Prescaler::Div64,
    ];

    /// Division factor
    #[inline]
    pub const fn factor(self) -> u32 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div4 => 4,
            Prescaler::Div16 => 16,
            Prescaler::Div64 => 64,
        }
    }
}

impl From<Prescaler> for Twps {
    fn from(p: Prescaler) -> Twps {
        match p {
            Prescaler::Div1 => Twps::Div1,
            Prescaler::Div4 => Twps::Div4,
            Prescaler::Div16 => Twps::Div16,
            Prescaler::Div64 => Twps::Div64,
        }
    }
}

// R/W bit appended to the slave address
#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Write = 0,
    Read = 1,
}

impl Direction {
    #[inline(always)]
    fn of(op: &Operation<'_>) -> Self {
        match op {
            Operation::Read(_) => Direction::Read,
            Operation::Write(_) => Direction::Write,
        }
    }

    // SLA+W or SLA+R
    #[inline(always)]
    fn sla(self, address: u8) -> u8 {
        ((address & 0x7F) << 1) | self as u8
    }

    #[inline(always)]
    fn address_ack(self) -> StatusCode {
        match self {
            Direction::Write => StatusCode::SlaWriteAck,
            Direction::Read => StatusCode::SlaReadAck,
        }
    }
}

/// I2C transaction errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError {
    /// A bus phase finished with a status other than the one it requires
    UnexpectedStatus {
        /// Status the phase requires to continue
        expected: StatusCode,
        /// Status reported by the peripheral
        actual: StatusCode,
    },
    /// The peripheral never signalled completion of a phase within the poll limit
    Timeout,
}

impl I2cError {
    /// Status reported by the peripheral when the transaction was aborted, if it finished a phase
    #[inline]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            I2cError::UnexpectedStatus { actual, .. } => Some(*actual),
            I2cError::Timeout => None,
        }
    }

    /// Slave did not acknowledge its address or a transmitted byte
    #[inline]
    pub fn is_nack(&self) -> bool {
        self.status()
            .map_or(false, |s| s.is_address_nack() || s.is_data_nack())
    }

    /// Another master won the bus
    #[inline]
    pub fn is_arbitration_lost(&self) -> bool {
        self.status() == Some(StatusCode::ArbitrationLost)
    }
}

/// Errors from choosing a bit rate with [`I2cConfig::scl_frequency()`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Requested frequency is zero
    ZeroFrequency,
    /// Requested frequency is above CPU frequency / 16
    SclTooFast,
    /// Requested frequency needs a divisor above 255 even with the largest prescaler
    SclTooSlow,
}

/// Struct used to configure the TWI peripheral as a bus master
pub struct I2cConfig<TWI: TwiBus> {
    twi: TWI,
    divisor: u8,
    prescaler: Prescaler,
    poll_limit: PollLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PollLimit {
    Derived,
    Fixed(NonZeroU32),
    Unbounded,
}

// CPU cycles per SCL period
#[inline(always)]
fn scl_period(divisor: u8, prescaler: Prescaler) -> u32 {
    16 + 2 * divisor as u32 * prescaler.factor()
}

impl<TWI: TwiBus> I2cConfig<TWI> {
    /// Create a new configuration. Defaults to a divisor of 72 with no prescaling (100 kHz with a
    /// 16 MHz CPU clock). Unless set explicitly, the poll limit is derived from the bit rate: a
    /// phase may take as many polls as it takes CPU cycles, with some margin, but never fewer
    /// than [`DEFAULT_POLL_LIMIT`].
    pub fn new(twi: TWI) -> Self {
        I2cConfig {
            twi,
            divisor: 72,
            prescaler: Prescaler::Div1,
            poll_limit: PollLimit::Derived,
        }
    }

    /// Set the TWBR divisor and prescaler directly
    #[inline]
    pub fn scl_divisor(mut self, divisor: u8, prescaler: Prescaler) -> Self {
        self.divisor = divisor;
        self.prescaler = prescaler;
        self
    }

    /// Pick the smallest prescaler and divisor whose SCL frequency does not exceed `scl_hz`
    pub fn scl_frequency(mut self, cpu_hz: u32, scl_hz: u32) -> Result<Self, ConfigError> {
        if scl_hz == 0 || cpu_hz == 0 {
            return Err(ConfigError::ZeroFrequency);
        }
        let ratio = cpu_hz.div_ceil(scl_hz);
        if ratio < 16 {
            return Err(ConfigError::SclTooFast);
        }

        for prescaler in Prescaler::ALL {
            let divisor = (ratio - 16).div_ceil(2 * prescaler.factor());
            if let Ok(divisor) = u8::try_from(divisor) {
                self.divisor = divisor;
                self.prescaler = prescaler;
                return Ok(self);
            }
        }
        Err(ConfigError::SclTooSlow)
    }

    /// Give up on a phase after `polls` unsuccessful checks of the completion flag
    #[inline]
    pub fn poll_limit(mut self, polls: NonZeroU32) -> Self {
        self.poll_limit = PollLimit::Fixed(polls);
        self
    }

    /// Wait for the completion flag indefinitely. A stuck bus hangs the caller.
    #[inline]
    pub fn no_timeout(mut self) -> Self {
        self.poll_limit = PollLimit::Unbounded;
        self
    }

    /// Performs hardware configuration and enables the peripheral
    pub fn configure(self) -> I2c<TWI> {
        self.twi.configure(self.divisor, self.prescaler.into());
        self.twi.enable();

        let poll_limit = match self.poll_limit {
            PollLimit::Derived => {
                let polls = scl_period(self.divisor, self.prescaler) * PHASE_BITS * POLL_MARGIN;
                NonZeroU32::new(polls.max(DEFAULT_POLL_LIMIT))
            }
            PollLimit::Fixed(polls) => Some(polls),
            PollLimit::Unbounded => None,
        };

        I2c {
            twi: self.twi,
            divisor: self.divisor,
            prescaler: self.prescaler,
            poll_limit,
        }
    }
}

/// TWI bus master
pub struct I2c<TWI: TwiBus> {
    twi: TWI,
    divisor: u8,
    prescaler: Prescaler,
    poll_limit: Option<NonZeroU32>,
}

impl<TWI: TwiBus> I2c<TWI> {
    /// SCL frequency produced by the configured divisor at the given CPU frequency
    #[inline]
    pub fn scl_hz(&self, cpu_hz: u32) -> u32 {
        cpu_hz / scl_period(self.divisor, self.prescaler)
    }

    /// Disable the peripheral and release it
    pub fn free(self) -> TWI {
        self.twi.disable();
        self.twi
    }

    /// Check whether a device acknowledges its address
    pub fn probe(&mut self, address: u8) -> Result<(), I2cError> {
        self.transact(|bus| {
            bus.begin(StatusCode::Start)?;
            bus.address(address, Direction::Write)
        })
    }

    /// Write one byte to a device
    #[inline]
    pub fn write_byte(&mut self, address: u8, data: u8) -> Result<(), I2cError> {
        self.write_multi(address, &[data])
    }

    /// Write one byte to register `reg` of a device
    #[inline]
    pub fn write_reg(&mut self, address: u8, reg: u8, data: u8) -> Result<(), I2cError> {
        self.write_multi_reg(address, reg, &[data])
    }

    /// Write bytes to a device. Stops at the first byte that is not acknowledged.
    pub fn write_multi(&mut self, address: u8, bytes: &[u8]) -> Result<(), I2cError> {
        self.transact(|bus| {
            bus.begin(StatusCode::Start)?;
            bus.address(address, Direction::Write)?;
            bytes.iter().try_for_each(|&byte| bus.send(byte))
        })
    }

    /// Write bytes to a device starting at register `reg`
    pub fn write_multi_reg(&mut self, address: u8, reg: u8, bytes: &[u8]) -> Result<(), I2cError> {
        self.transact(|bus| {
            bus.begin(StatusCode::Start)?;
            bus.address(address, Direction::Write)?;
            bus.send(reg)?;
            bytes.iter().try_for_each(|&byte| bus.send(byte))
        })
    }

    /// Read one byte from a device
    pub fn read_byte(&mut self, address: u8) -> Result<u8, I2cError> {
        let mut buffer = [0];
        self.read_multi(address, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Read one byte from register `reg` of a device
    pub fn read_reg(&mut self, address: u8, reg: u8) -> Result<u8, I2cError> {
        let mut buffer = [0];
        self.read_multi_reg(address, reg, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Fill `buffer` from a device. Every byte but the last is acknowledged.
    ///
    /// An empty buffer returns immediately without touching the bus.
    pub fn read_multi(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), I2cError> {
        if buffer.is_empty() {
            return Ok(());
        }
        self.transact(|bus| {
            bus.begin(StatusCode::Start)?;
            bus.address(address, Direction::Read)?;
            bus.receive_into(buffer, true)
        })
    }

    /// Fill `buffer` from a device starting at register `reg`, switching from writing the
    /// register to reading with a repeated start.
    ///
    /// An empty buffer returns immediately without touching the bus.
    pub fn read_multi_reg(&mut self, address: u8, reg: u8, buffer: &mut [u8]) -> Result<(), I2cError> {
        if buffer.is_empty() {
            return Ok(());
        }
        self.transact(|bus| {
            bus.begin(StatusCode::Start)?;
            bus.address(address, Direction::Write)?;
            bus.send(reg)?;
            bus.begin(StatusCode::RepeatedStart)?;
            bus.address(address, Direction::Read)?;
            bus.receive_into(buffer, true)
        })
    }

    /// Probe every non-reserved address and call `found` for each one that acknowledges.
    ///
    /// Addresses answering with NACK are skipped. Any other failure, such as arbitration loss
    /// or a timeout, ends the scan with that error.
    pub fn scan<F: FnMut(u8)>(&mut self, mut found: F) -> Result<(), I2cError> {
        for address in FIRST_ADDRESS..=LAST_ADDRESS {
            match self.probe(address) {
                Ok(()) => found(address),
                Err(e) if e.is_nack() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // Contiguous operations of the same direction share one address phase. The last byte of
    // each read segment is answered with NACK. Empty reads are dropped, since SLA+R must be
    // followed by at least one received byte.
    fn execute(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), I2cError> {
        let mut operations = operations
            .iter_mut()
            .filter(|op| !matches!(op, Operation::Read(buffer) if buffer.is_empty()))
            .peekable();
        if operations.peek().is_none() {
            return Ok(());
        }
        self.transact(|bus| {
            let mut previous: Option<Direction> = None;
            while let Some(op) = operations.next() {
                let direction = Direction::of(op);
                if previous != Some(direction) {
                    let expected = match previous {
                        None => StatusCode::Start,
                        Some(_) => StatusCode::RepeatedStart,
                    };
                    bus.begin(expected)?;
                    bus.address(address, direction)?;
                }

                let segment_ends = operations
                    .peek()
                    .map_or(true, |next| Direction::of(next) != direction);

                match op {
                    Operation::Write(bytes) => bytes.iter().try_for_each(|&byte| bus.send(byte))?,
                    Operation::Read(buffer) => bus.receive_into(buffer, segment_ends)?,
                }
                previous = Some(direction);
            }
            Ok(())
        })
    }

    // Runs the phases in `f`, then releases the bus with a stop condition regardless of outcome
    #[inline]
    fn transact<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R, I2cError>) -> Result<R, I2cError> {
        let result = f(self);
        #[cfg(feature = "defmt")]
        if let Err(e) = &result {
            defmt::debug!("TWI transaction aborted: {}", e);
        }
        self.stop();
        result
    }

    #[inline]
    fn begin(&mut self, expected: StatusCode) -> Result<(), I2cError> {
        self.start()?;
        status::check(&self.twi, expected)
    }

    #[inline]
    fn address(&mut self, address: u8, direction: Direction) -> Result<(), I2cError> {
        self.transmit(direction.sla(address))?;
        status::check(&self.twi, direction.address_ack())
    }

    #[inline]
    fn send(&mut self, byte: u8) -> Result<(), I2cError> {
        self.transmit(byte)?;
        status::check(&self.twi, StatusCode::DataTransmittedAck)
    }

    fn receive_into(&mut self, buffer: &mut [u8], nack_last: bool) -> Result<(), I2cError> {
        let last = buffer.len().wrapping_sub(1);
        for (i, slot) in buffer.iter_mut().enumerate() {
            if nack_last && i == last {
                *slot = self.receive_nack()?;
                status::check(&self.twi, StatusCode::DataReceivedNack)?;
            } else {
                *slot = self.receive_ack()?;
                status::check(&self.twi, StatusCode::DataReceivedAck)?;
            }
        }
        Ok(())
    }

    // Also used for repeated starts; only the resulting status differs
    #[inline]
    fn start(&mut self) -> Result<(), I2cError> {
        self.twi.twcr_wr(Twcr::TWINT | Twcr::TWSTA | Twcr::TWEN);
        self.await_completion()
    }

    // TWSTO clears itself once the stop is on the bus, so there is nothing to wait for
    #[inline]
    fn stop(&mut self) {
        self.twi.twcr_wr(Twcr::TWINT | Twcr::TWSTO | Twcr::TWEN);
    }

    #[inline]
    fn transmit(&mut self, byte: u8) -> Result<(), I2cError> {
        self.twi.twdr_wr(byte);
        self.twi.twcr_wr(Twcr::TWINT | Twcr::TWEN);
        self.await_completion()
    }

    #[inline]
    fn receive_ack(&mut self) -> Result<u8, I2cError> {
        self.twi.twcr_wr(Twcr::TWINT | Twcr::TWEA | Twcr::TWEN);
        self.await_completion()?;
        Ok(self.twi.twdr_rd())
    }

    #[inline]
    fn receive_nack(&mut self) -> Result<u8, I2cError> {
        self.twi.twcr_wr(Twcr::TWINT | Twcr::TWEN);
        self.await_completion()?;
        Ok(self.twi.twdr_rd())
    }

    #[inline(always)]
    fn poll_complete(&self) -> nb::Result<(), Infallible> {
        if self.twi.operation_complete() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn await_completion(&self) -> Result<(), I2cError> {
        let limit = match self.poll_limit {
            Some(limit) => limit.get(),
            None => {
                return match nb::block!(self.poll_complete()) {
                    Ok(()) => Ok(()),
                    Err(never) => match never {},
                }
            }
        };

        for _ in 0..limit {
            match self.poll_complete() {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(never)) => match never {},
            }
        }
        Err(I2cError::Timeout)
    }
}

mod ehal1 {
    use super::*;
    use embedded_hal::i2c::{Error, ErrorKind, ErrorType, NoAcknowledgeSource, SevenBitAddress};

    impl Error for I2cError {
        fn kind(&self) -> ErrorKind {
            match self {
                I2cError::UnexpectedStatus { actual, .. } => match actual {
                    StatusCode::SlaWriteNack | StatusCode::SlaReadNack => {
                        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
                    }
                    StatusCode::DataTransmittedNack => {
                        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)
                    }
                    StatusCode::ArbitrationLost => ErrorKind::ArbitrationLoss,
                    // Illegal start or stop condition
                    StatusCode::Unrecognized(0x00) => ErrorKind::Bus,
                    _ => ErrorKind::Other,
                },
                I2cError::Timeout => ErrorKind::Other,
            }
        }
    }

    impl<TWI: TwiBus> ErrorType for I2c<TWI> {
        type Error = I2cError;
    }

    impl<TWI: TwiBus> embedded_hal::i2c::I2c<SevenBitAddress> for I2c<TWI> {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            self.execute(address, operations)
        }
    }
}

#[cfg(feature = "embedded-hal-02")]
mod ehal02 {
    use super::*;
    use embedded_hal_02::blocking::i2c::{Read, Write, WriteRead};

    impl<TWI: TwiBus> Read for I2c<TWI> {
        type Error = I2cError;
        fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
            self.read_multi(address, buffer)
        }
    }

    impl<TWI: TwiBus> Write for I2c<TWI> {
        type Error = I2cError;
        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
            self.write_multi(address, bytes)
        }
    }

    impl<TWI: TwiBus> WriteRead for I2c<TWI> {
        type Error = I2cError;
        fn write_read(
            &mut self,
            address: u8,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> Result<(), Self::Error> {
            self.execute(address, &mut [Operation::Write(bytes), Operation::Read(buffer)])
        }
    }
}
