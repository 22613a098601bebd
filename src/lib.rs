//! Blocking TWI (I2C) bus master for AVR microcontrollers, implementing [`embedded_hal`] traits.
//! See the "2-wire Serial Interface" chapter of the [`ATmega328P datasheet`] for reference.
//!
//! [`embedded_hal`]: https://github.com/rust-embedded/embedded-hal
//! [`ATmega328P datasheet`]: https://ww1.microchip.com/downloads/en/DeviceDoc/Atmel-7810-Automotive-Microcontrollers-ATmega328P_Datasheet.pdf
//!
//! # Usage
//!
//! Enable exactly one device feature (`atmega328p`, `atmega32u4` or `atmega2560`) to drive the
//! real peripheral through the [`avr-device`] PAC. Without one, the crate builds on any host,
//! which is how its tests run.
//!
//! ```ignore
//! let dp = avr_twi::pac::Peripherals::take().unwrap();
//! let mut i2c = I2cConfig::new(dp.TWI)
//!     .scl_frequency(16_000_000, 100_000)?
//!     .configure();
//!
//! i2c.write_reg(0x68, 0x6B, 0x00)?;
//! let who_am_i = i2c.read_reg(0x68, 0x75)?;
//! ```
//!
//! # Features
//!
//! - `embedded-hal-02` - implement the blocking I2C traits of embedded-hal 0.2
//! - `defmt` - derive `defmt::Format` for public types and log aborted transactions
//!
//! [`avr-device`]: https://github.com/Rahix/avr-device

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

pub mod i2c;
pub mod status;

mod hw_traits;

pub use i2c::{I2c, I2cConfig, I2cError};
pub use status::StatusCode;

#[cfg(feature = "atmega328p")]
pub use avr_device::atmega328p as pac;
#[cfg(feature = "atmega32u4")]
pub use avr_device::atmega32u4 as pac;
#[cfg(feature = "atmega2560")]
pub use avr_device::atmega2560 as pac;
