// Register-file I²C target for driver tests. Writes set the register
// pointer (first byte, auto-increment bit masked) and store the rest;
// reads stream out from the pointer.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};

#[derive(Default)]
pub struct MockI2c {
    pub(crate) regs: BTreeMap<(u8, u8), u8>,
    pub(crate) ptr: BTreeMap<u8, u8>,
    pub writes: Vec<(u8, u8, u8)>,
    pub fail: bool,
}

impl MockI2c {
    pub fn set(&mut self, addr: u8, reg: u8, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.regs.insert((addr, reg + i as u8), *b);
        }
    }

    pub fn get(&self, addr: u8, reg: u8) -> u8 {
        self.regs.get(&(addr, reg)).copied().unwrap_or(0)
    }
}

impl ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for MockI2c {
    fn transaction(&mut self, addr: u8, ops: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        if self.fail {
            return Err(ErrorKind::Other);
        }
        for op in ops {
            match op {
                Operation::Write(bytes) => {
                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    let reg = reg & 0x7F;
                    self.ptr.insert(addr, reg);
                    for (i, b) in data.iter().enumerate() {
                        let r = reg + i as u8;
                        self.regs.insert((addr, r), *b);
                        self.writes.push((addr, r, *b));
                    }
                }
                Operation::Read(buf) => {
                    let reg = self.ptr.get(&addr).copied().unwrap_or(0);
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = self.get(addr, reg + i as u8);
                    }
                }
            }
        }
        Ok(())
    }
}
