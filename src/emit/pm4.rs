//! PM4 packet stream writer.
//!
//! Register writes are encoded as type-3 packets; consecutive writes to
//! adjacent registers of the same packet type coalesce into one multi-dword
//! packet. The stream has a fixed dword budget, checked when it is
//! finished, so encoders can emit unconditionally.

use crate::core::error::Error;

pub const PKT3_SET_CONFIG_REG: u32 = 0x68;
pub const PKT3_SET_CONTEXT_REG: u32 = 0x69;
pub const PKT3_SET_SH_REG: u32 = 0x76;
pub const PKT3_SET_UCONFIG_REG: u32 = 0x79;

const CONFIG_REG_OFFSET: u32 = 0x8000;
const CONFIG_REG_END: u32 = 0xB000;
const SH_REG_OFFSET: u32 = 0xB000;
const SH_REG_END: u32 = 0xC000;
const CONTEXT_REG_OFFSET: u32 = 0x28000;
const CONTEXT_REG_END: u32 = 0x30000;
const UCONFIG_REG_OFFSET: u32 = 0x30000;
const UCONFIG_REG_END: u32 = 0x40000;

const fn pkt3(opcode: u32, count: u32) -> u32 {
    (3 << 30) | ((count & 0x3fff) << 16) | ((opcode & 0xff) << 8)
}

/// Bounded PM4 stream under construction.
#[derive(Debug)]
pub struct Pm4Stream {
    dw: Vec<u32>,
    max_dw: usize,
    last_opcode: u32,
    last_reg: u32,
    /// Index of the current packet's header dword.
    last_pkt: usize,
}

const NO_PACKET: usize = usize::MAX;

impl Pm4Stream {
    pub fn new(max_dw: usize) -> Self {
        Self {
            dw: Vec::with_capacity(max_dw),
            max_dw,
            last_opcode: 0xff,
            last_reg: 0,
            last_pkt: NO_PACKET,
        }
    }

    fn opcode_for(reg: u32) -> (u32, u32) {
        if (CONFIG_REG_OFFSET..CONFIG_REG_END).contains(&reg) {
            (PKT3_SET_CONFIG_REG, CONFIG_REG_OFFSET)
        } else if (SH_REG_OFFSET..SH_REG_END).contains(&reg) {
            (PKT3_SET_SH_REG, SH_REG_OFFSET)
        } else if (CONTEXT_REG_OFFSET..CONTEXT_REG_END).contains(&reg) {
            (PKT3_SET_CONTEXT_REG, CONTEXT_REG_OFFSET)
        } else if (UCONFIG_REG_OFFSET..UCONFIG_REG_END).contains(&reg) {
            (PKT3_SET_UCONFIG_REG, UCONFIG_REG_OFFSET)
        } else {
            // Unknown ranges would hang the CP; flag through the budget
            // check by writing nothing.
            (0, 0)
        }
    }

    /// Write one register. `reg` is the byte offset from sid.h.
    pub fn set_reg(&mut self, reg: u32, value: u32) {
        let (opcode, base) = Self::opcode_for(reg);
        if opcode == 0 {
            error!("register {reg:#x} outside every programmable range");
            return;
        }
        let reg_dw = (reg - base) >> 2;

        if self.last_pkt != NO_PACKET && opcode == self.last_opcode && reg_dw == self.last_reg + 1 {
            // Grow the current packet; the count field is payload - 1.
            self.dw.push(value);
            let count = (self.dw.len() - self.last_pkt - 2) as u32;
            self.dw[self.last_pkt] = pkt3(opcode, count);
        } else {
            self.last_pkt = self.dw.len();
            self.dw.push(pkt3(opcode, 1));
            self.dw.push(reg_dw);
            self.dw.push(value);
        }
        self.last_opcode = opcode;
        self.last_reg = reg_dw;
    }

    /// Write a run of consecutive registers starting at `reg`.
    pub fn set_reg_seq(&mut self, reg: u32, values: &[u32]) {
        for (i, v) in values.iter().enumerate() {
            self.set_reg(reg + 4 * i as u32, *v);
        }
    }

    pub fn dwords(&self) -> &[u32] {
        &self.dw
    }

    /// Validate the budget and take the stream.
    pub fn finish(self) -> Result<Vec<u32>, Error> {
        if self.dw.len() > self.max_dw {
            error!(
                "PM4 stream overflow: {} dwords in a {}-dword budget",
                self.dw.len(),
                self.max_dw
            );
            return Err(Error::InternalAssertion("PM4 stream overflow"));
        }
        Ok(self.dw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_write_packet_shape() {
        let mut s = Pm4Stream::new(16);
        s.set_reg(0x028238, 0xdead_beef); // CB_TARGET_MASK
        let dw = s.finish().unwrap();
        assert_eq!(dw.len(), 3);
        assert_eq!(dw[0], pkt3(PKT3_SET_CONTEXT_REG, 1));
        assert_eq!(dw[1], (0x028238 - 0x028000) >> 2);
        assert_eq!(dw[2], 0xdead_beef);
    }

    #[test]
    fn adjacent_writes_coalesce() {
        let mut s = Pm4Stream::new(16);
        s.set_reg_seq(0x028780, &[1, 2, 3]); // CB_BLEND0..2_CONTROL
        let dw = s.finish().unwrap();
        // One header + one offset + three values.
        assert_eq!(dw.len(), 5);
        assert_eq!(dw[0], pkt3(PKT3_SET_CONTEXT_REG, 3));
        assert_eq!(&dw[2..], &[1, 2, 3]);
    }

    #[test]
    fn non_adjacent_writes_split_packets() {
        let mut s = Pm4Stream::new(16);
        s.set_reg(0x028780, 1);
        s.set_reg(0x028800, 2);
        let dw = s.finish().unwrap();
        assert_eq!(dw.len(), 6);
    }

    #[test]
    fn sh_and_context_use_distinct_opcodes() {
        let mut s = Pm4Stream::new(16);
        s.set_reg(0x00b020, 0x1234); // SPI_SHADER_PGM_LO_PS
        s.set_reg(0x028238, 0x5678);
        let dw = s.finish().unwrap();
        assert_eq!(dw[0] >> 8 & 0xff, PKT3_SET_SH_REG);
        assert_eq!(dw[3] >> 8 & 0xff, PKT3_SET_CONTEXT_REG);
    }

    #[test]
    fn overflow_is_an_error() {
        let mut s = Pm4Stream::new(2);
        s.set_reg(0x028238, 0);
        assert!(s.finish().is_err());
    }
}
