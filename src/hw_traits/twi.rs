use bitflags::bitflags;

bitflags! {
    /// TWCR bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Twcr: u8 {
        /// Operation complete. Writing a one clears it and starts the next operation.
        const TWINT = 0x80;
        /// Return ACK after the next received byte
        const TWEA = 0x40;
        /// Request a start condition
        const TWSTA = 0x20;
        /// Request a stop condition, cleared by hardware once sent
        const TWSTO = 0x10;
        /// Write collision
        const TWWC = 0x08;
        /// Peripheral enable
        const TWEN = 0x04;
        /// Interrupt enable
        const TWIE = 0x01;
    }
}

/// TWSR prescaler bits (TWPS1:0)
pub const TWSR_TWPS_MASK: u8 = 0x03;

/// Bit-rate prescaler applied on top of the TWBR divisor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Twps {
    Div1 = 0,
    Div4 = 1,
    Div16 = 2,
    Div64 = 3,
}

pub trait TwiPeriph {
    fn twcr_rd(&self) -> Twcr;
    fn twcr_wr(&self, bits: Twcr);

    fn twsr_rd(&self) -> u8;
    fn twsr_wr(&self, bits: u8);

    fn twdr_rd(&self) -> u8;
    fn twdr_wr(&self, bits: u8);

    fn twbr_wr(&self, bits: u8);

    // only call while the peripheral is idle
    #[inline]
    fn configure(&self, divisor: u8, prescaler: Twps) {
        self.twbr_wr(divisor);
        self.twsr_wr(prescaler as u8 & TWSR_TWPS_MASK);
    }

    #[inline]
    fn enable(&self) {
        self.twcr_wr(self.twcr_rd() | Twcr::TWEN);
    }

    #[inline]
    fn disable(&self) {
        self.twcr_wr(self.twcr_rd().difference(Twcr::TWEN | Twcr::TWINT));
    }

    #[inline(always)]
    fn operation_complete(&self) -> bool {
        self.twcr_rd().contains(Twcr::TWINT)
    }
}

#[cfg(feature = "device")]
macro_rules! twi_impl {
    ($Twi:ty) => {
        impl TwiPeriph for $Twi {
            #[inline(always)]
            fn twcr_rd(&self) -> Twcr {
                Twcr::from_bits_retain(self.twcr.read().bits())
            }

            #[inline(always)]
            fn twcr_wr(&self, bits: Twcr) {
                self.twcr.write(|w| unsafe { w.bits(bits.bits()) });
            }

            #[inline(always)]
            fn twsr_rd(&self) -> u8 {
                self.twsr.read().bits()
            }

            #[inline(always)]
            fn twsr_wr(&self, bits: u8) {
                self.twsr.write(|w| unsafe { w.bits(bits) });
            }

            #[inline(always)]
            fn twdr_rd(&self) -> u8 {
                self.twdr.read().bits()
            }

            #[inline(always)]
            fn twdr_wr(&self, bits: u8) {
                self.twdr.write(|w| unsafe { w.bits(bits) });
            }

            #[inline(always)]
            fn twbr_wr(&self, bits: u8) {
                self.twbr.write(|w| unsafe { w.bits(bits) });
            }
        }
    };
}

#[cfg(feature = "device")]
twi_impl!(crate::pac::TWI);
