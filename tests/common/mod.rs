//! Simulated I2C register file and delay shared by the host tests.
#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

/// One observable bus (or delay) action, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write { register: u8, data: Vec<u8> },
    Read { register: u8, len: usize },
    Delay { ns: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBusError {
    Nack,
}

impl i2c::Error for FakeBusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

pub struct BusState {
    pub address: u8,
    pub registers: [u8; 256],
    pub events: Vec<Event>,
    pub fail: bool,
}

impl BusState {
    pub fn set_u16_le(&mut self, register: u8, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.registers[usize::from(register)] = lo;
        self.registers[usize::from(register.wrapping_add(1))] = hi;
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Write { register, data } => Some((*register, data.clone())),
                _ => None,
            })
            .collect()
    }
}

/// A device that answers at one address with a flat, auto-incrementing
/// register file. Clones share the same state.
#[derive(Clone)]
pub struct FakeBus {
    state: Rc<RefCell<BusState>>,
}

impl FakeBus {
    pub fn new(address: u8) -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                address,
                registers: [0; 256],
                events: Vec::new(),
                fail: false,
            })),
        }
    }

    pub fn delay(&self) -> FakeDelay {
        FakeDelay {
            state: Rc::clone(&self.state),
        }
    }

    pub fn state(&self) -> std::cell::RefMut<'_, BusState> {
        self.state.borrow_mut()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn register(&self, register: u8) -> u8 {
        self.state.borrow().registers[usize::from(register)]
    }
}

impl ErrorType for FakeBus {
    type Error = FakeBusError;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail || address != state.address {
            return Err(FakeBusError::Nack);
        }

        let mut frame: Vec<u8> = Vec::new();
        let mut did_read = false;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => frame.extend_from_slice(bytes),
                Operation::Read(buffer) => {
                    let register = frame.first().copied().unwrap_or(0);
                    for (offset, byte) in buffer.iter_mut().enumerate() {
                        let index = register.wrapping_add(offset as u8);
                        *byte = state.registers[usize::from(index)];
                    }
                    state.events.push(Event::Read {
                        register,
                        len: buffer.len(),
                    });
                    did_read = true;
                }
            }
        }

        if !did_read {
            let (&register, data) = frame.split_first().ok_or(FakeBusError::Nack)?;
            for (offset, byte) in data.iter().enumerate() {
                let index = register.wrapping_add(offset as u8);
                state.registers[usize::from(index)] = *byte;
            }
            state.events.push(Event::Write {
                register,
                data: data.to_vec(),
            });
        }
        Ok(())
    }
}

/// Records delays into the bus event log, so their order relative to
/// register writes can be checked.
pub struct FakeDelay {
    state: Rc<RefCell<BusState>>,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().events.push(Event::Delay { ns });
    }
}
