//! Scripted stand-in for the TWI register block.
//!
//! Every write to TWCR with TWINT set starts a bus operation. The operation is recorded as a
//! [`BusEvent`] and completed with the next queued [`Reply`]; once the queue runs dry the
//! operation never completes, like a bus with a slave holding SCL low.

use super::twi::{Twcr, TwiPeriph, TWSR_TWPS_MASK};
use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

const TWSR_IDLE: u8 = 0xF8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    Stop,
    Transmit(u8),
    Receive { ack: bool },
}

#[derive(Clone, Copy, Debug)]
struct Reply {
    status: u8,
    data: u8,
}

pub struct MockTwi {
    twcr: Cell<Twcr>,
    twsr: Cell<u8>,
    twdr: Cell<u8>,
    twbr: Cell<u8>,
    pending_tx: Cell<Option<u8>>,
    replies: RefCell<VecDeque<Reply>>,
    events: RefCell<Vec<BusEvent>>,
    control_writes: RefCell<Vec<Twcr>>,
}

impl MockTwi {
    pub fn new() -> Self {
        MockTwi {
            twcr: Cell::new(Twcr::empty()),
            twsr: Cell::new(TWSR_IDLE),
            twdr: Cell::new(0xFF),
            twbr: Cell::new(0),
            pending_tx: Cell::new(None),
            replies: RefCell::new(VecDeque::new()),
            events: RefCell::new(Vec::new()),
            control_writes: RefCell::new(Vec::new()),
        }
    }

    /// Queue the status code reported by the next operation
    pub fn reply(self, status: u8) -> Self {
        self.reply_data(status, 0xFF)
    }

    /// Queue the status code and received byte reported by the next operation
    pub fn reply_data(self, status: u8, data: u8) -> Self {
        self.replies.borrow_mut().push_back(Reply { status, data });
        self
    }

    pub fn replies(mut self, statuses: &[u8]) -> Self {
        for &status in statuses {
            self = self.reply(status);
        }
        self
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.events.borrow().clone()
    }

    pub fn control_writes(&self) -> Vec<Twcr> {
        self.control_writes.borrow().clone()
    }

    pub fn twbr(&self) -> u8 {
        self.twbr.get()
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.borrow().len()
    }

    fn run(&self, bits: Twcr) {
        if bits.contains(Twcr::TWSTO) {
            self.events.borrow_mut().push(BusEvent::Stop);
            self.twcr.set(bits.difference(Twcr::TWSTO | Twcr::TWINT));
            self.set_status(TWSR_IDLE);
            return;
        }

        let event = if bits.contains(Twcr::TWSTA) {
            BusEvent::Start
        } else if let Some(byte) = self.pending_tx.take() {
            BusEvent::Transmit(byte)
        } else {
            BusEvent::Receive {
                ack: bits.contains(Twcr::TWEA),
            }
        };
        self.events.borrow_mut().push(event);

        // Hardware clears TWINT on the write; it only rises again once the operation finishes.
        self.twcr.set(bits.difference(Twcr::TWINT));
        if let Some(reply) = self.replies.borrow_mut().pop_front() {
            self.set_status(reply.status);
            if let BusEvent::Receive { .. } = event {
                self.twdr.set(reply.data);
            }
            self.twcr.set(self.twcr.get() | Twcr::TWINT);
        }
    }

    fn set_status(&self, status: u8) {
        let prescaler = self.twsr.get() & TWSR_TWPS_MASK;
        self.twsr.set((status & !TWSR_TWPS_MASK) | prescaler);
    }
}

impl TwiPeriph for MockTwi {
    fn twcr_rd(&self) -> Twcr {
        self.twcr.get()
    }

    fn twcr_wr(&self, bits: Twcr) {
        self.control_writes.borrow_mut().push(bits);
        if bits.contains(Twcr::TWINT | Twcr::TWEN) {
            self.run(bits);
        } else {
            self.twcr.set(bits.difference(Twcr::TWINT) | (self.twcr.get() & Twcr::TWINT));
        }
    }

    fn twsr_rd(&self) -> u8 {
        self.twsr.get()
    }

    fn twsr_wr(&self, bits: u8) {
        // Only the prescaler bits are writable
        self.twsr
            .set((self.twsr.get() & !TWSR_TWPS_MASK) | (bits & TWSR_TWPS_MASK));
    }

    fn twdr_rd(&self) -> u8 {
        self.twdr.get()
    }

    fn twdr_wr(&self, bits: u8) {
        self.twdr.set(bits);
        self.pending_tx.set(Some(bits));
    }

    fn twbr_wr(&self, bits: u8) {
        self.twbr.set(bits);
    }
}
