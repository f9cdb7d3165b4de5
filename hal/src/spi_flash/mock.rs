//! In-memory flash controller model.
//!
//! Implements [`FlashController`] over a software flash device: JEDEC ID,
//! SR1/SR2 with WEL/WIP behaviour, a 64 KiB memory window with NOR
//! program/erase semantics, security register blocks, the XMCA OTP-mode
//! register and the XMCB function register. Every executed opcode is
//! recorded so tests can assert command sequences.

use super::ctrl::{CmdWord, FlashController};

const MEMORY_WINDOW: usize = 64 * 1024;
const SREG_BLOCK: usize = 1024;
const SREG_COUNT: usize = 4;

const SR_WIP: u16 = 1 << 0;
const SR_WEL: u16 = 1 << 1;
const SR_SUS2: u16 = 1 << 10;
const SR_SUS1: u16 = 1 << 15;

/// How many SR1 reads report WIP after a non-volatile write begins.
const WIP_READS: u32 = 3;

/// Software model of a SPI-NOR part behind its controller.
pub struct MockFlash {
    mid: u32,
    sr: u16,
    otp_sr: u8,
    function_reg: u8,
    memory: Vec<u8>,
    sreg: [[u8; SREG_BLOCK]; SREG_COUNT],
    sfdp: Vec<u8>,
    uid: [u8; 18],

    wel: bool,
    vol_wel: bool,
    otp_mode: bool,
    reset_enabled: bool,
    powered_down: bool,
    wip_reads: u32,

    // Controller-side transfer state.
    tx: Vec<u8>,
    rx: Vec<u8>,
    rx_size: usize,
    fifo_width: usize,
    readback: u32,

    log: Vec<u8>,
}

impl MockFlash {
    /// Creates a model responding to RDID with the given
    /// manufacturer/memory-type/capacity bytes.
    pub fn new(id: [u8; 3]) -> Self {
        Self {
            mid: u32::from(id[0]) | u32::from(id[1]) << 8 | u32::from(id[2]) << 16,
            sr: 0,
            otp_sr: 0,
            function_reg: 0,
            memory: vec![0xff; MEMORY_WINDOW],
            sreg: [[0xff; SREG_BLOCK]; SREG_COUNT],
            sfdp: Vec::new(),
            uid: [0; 18],
            wel: false,
            vol_wel: false,
            otp_mode: false,
            reset_enabled: false,
            powered_down: false,
            wip_reads: 0,
            tx: Vec::new(),
            rx: Vec::new(),
            rx_size: 0,
            fifo_width: 1,
            readback: 0,
            log: Vec::new(),
        }
    }

    pub fn with_sr(mut self, sr: u16) -> Self {
        self.sr = sr;
        self
    }

    pub fn with_sfdp(mut self, data: Vec<u8>) -> Self {
        self.sfdp = data;
        self
    }

    pub fn with_uid(mut self, uid: [u8; 18]) -> Self {
        self.uid = uid;
        self
    }

    /// Executed opcodes in order.
    pub fn opcode_log(&self) -> &[u8] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Current status register (SR2 high, SR1 low), without the WIP
    /// overlay.
    pub fn sr(&self) -> u16 {
        self.sr
    }

    /// The modelled memory window starting at flash offset 0.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn security_block(&self, num: u8) -> &[u8] {
        &self.sreg[usize::from(num) % SREG_COUNT]
    }

    pub fn is_powered_down(&self) -> bool {
        self.powered_down
    }

    /// FIFO width programmed for the most recent transaction.
    pub fn last_fifo_width(&self) -> usize {
        self.fifo_width
    }

    fn sr1_read(&mut self) -> u8 {
        let base = if self.otp_mode {
            self.otp_sr
        } else {
            self.sr as u8
        };
        if self.wip_reads > 0 {
            self.wip_reads -= 1;
            base | SR_WIP as u8
        } else {
            base & !(SR_WIP as u8)
        }
    }

    fn begin_nonvolatile_write(&mut self) {
        self.wip_reads = WIP_READS;
    }

    fn can_write(&self) -> bool {
        self.wel || self.vol_wel
    }

    fn finish_write(&mut self) {
        if self.wel {
            // Non-volatile writes clear WEL and take time.
            self.wel = false;
            self.sr &= !SR_WEL;
            self.begin_nonvolatile_write();
        }
        self.vol_wel = false;
    }

    fn write_sr1_value(&mut self, value: u8) {
        if self.otp_mode {
            self.otp_sr = value;
        } else {
            // WIP and WEL are read-only.
            self.sr = (self.sr & 0xff00) | u16::from(value & 0xfc);
        }
    }

    fn addr_from_tx(tx: &[u8]) -> u32 {
        u32::from(tx[0]) << 16 | u32::from(tx[1]) << 8 | u32::from(tx[2])
    }

    fn sreg_slot(&mut self, address: u32) -> (&mut [u8; SREG_BLOCK], usize) {
        let num = (address >> 12) as usize % SREG_COUNT;
        (&mut self.sreg[num], (address & 0xfff) as usize)
    }

    fn program_memory(&mut self, address: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            let at = address as usize + i;
            if at < self.memory.len() {
                // NOR semantics: program only clears bits.
                self.memory[at] &= byte;
            }
        }
    }

    fn erase_memory(&mut self, address: u32, len: u32) {
        let start = (address as usize).min(self.memory.len());
        let end = (address as usize + len as usize).min(self.memory.len());
        self.memory[start..end].fill(0xff);
    }

    fn execute(&mut self, cmd: CmdWord) -> Vec<u8> {
        let op = cmd.opcode();
        let tx = core::mem::take(&mut self.tx);

        if self.powered_down && op != 0xab {
            return vec![0; self.rx_size];
        }

        match op {
            0x9f => {
                return self.mid.to_le_bytes()[..3].to_vec();
            }
            0x05 => {
                return vec![self.sr1_read()];
            }
            0x35 => {
                return vec![(self.sr >> 8) as u8];
            }
            0x06 => {
                self.wel = true;
                self.sr |= SR_WEL;
            }
            0x04 => {
                self.wel = false;
                self.sr &= !SR_WEL;
                self.otp_mode = false;
            }
            0x50 => {
                self.vol_wel = true;
            }
            0x01 => {
                if self.can_write() {
                    self.write_sr1_value(tx[0]);
                    if tx.len() >= 2 && !self.otp_mode {
                        self.sr = (self.sr & 0x00ff) | (u16::from(tx[1]) << 8);
                    }
                    self.finish_write();
                }
            }
            0x31 => {
                if self.can_write() {
                    self.sr = (self.sr & 0x00ff) | (u16::from(tx[0]) << 8);
                    self.finish_write();
                }
            }
            0x02 => {
                if self.wel {
                    self.program_memory(cmd.address(), &tx);
                    self.finish_write();
                }
            }
            0x20 => {
                if self.wel {
                    self.erase_memory(cmd.address() & !0xfff, 4096);
                    self.finish_write();
                }
            }
            0x52 => {
                if self.wel {
                    self.erase_memory(cmd.address() & !0x7fff, 32 * 1024);
                    self.finish_write();
                }
            }
            0xd8 => {
                if self.wel {
                    self.erase_memory(cmd.address() & !0xffff, 64 * 1024);
                    self.finish_write();
                }
            }
            0xc7 => {
                if self.wel {
                    self.memory.fill(0xff);
                    self.finish_write();
                }
            }
            0x66 => {
                self.reset_enabled = true;
            }
            0x99 => {
                if self.reset_enabled {
                    self.sr &= !(SR_WIP | SR_WEL | SR_SUS1 | SR_SUS2);
                    self.wel = false;
                    self.vol_wel = false;
                    self.otp_mode = false;
                    self.wip_reads = 0;
                    self.reset_enabled = false;
                }
            }
            0xb9 => {
                self.powered_down = true;
            }
            0xab => {
                self.powered_down = false;
            }
            0x75 => {
                self.sr |= SR_SUS1;
            }
            0x7a => {
                self.sr &= !(SR_SUS1 | SR_SUS2);
            }
            0x3a => {
                self.otp_mode = true;
            }
            0x5a => {
                let address = Self::addr_from_tx(&tx) as usize;
                let mut resp = vec![0u8; self.rx_size];
                for (i, byte) in resp.iter_mut().enumerate() {
                    *byte = self.sfdp.get(address + i).copied().unwrap_or(0);
                }
                return resp;
            }
            0x48 => {
                if tx.is_empty() {
                    return vec![self.function_reg];
                }
                let address = Self::addr_from_tx(&tx);
                let rx_size = self.rx_size;
                let (block, offset) = self.sreg_slot(address);
                return block[offset..(offset + rx_size).min(SREG_BLOCK)].to_vec();
            }
            0x68 => {
                let address = Self::addr_from_tx(&tx);
                let rx_size = self.rx_size;
                let (block, offset) = self.sreg_slot(address);
                return block[offset..(offset + rx_size).min(SREG_BLOCK)].to_vec();
            }
            0x42 => {
                if self.can_write() {
                    if tx.len() == 1 {
                        self.function_reg = tx[0];
                    } else {
                        let address = Self::addr_from_tx(&tx);
                        let (block, offset) = self.sreg_slot(address);
                        for (i, byte) in tx[3..].iter().enumerate() {
                            if offset + i < SREG_BLOCK {
                                block[offset + i] &= byte;
                            }
                        }
                    }
                    self.finish_write();
                }
            }
            0x62 => {
                if self.wel {
                    let address = Self::addr_from_tx(&tx);
                    let (block, offset) = self.sreg_slot(address);
                    for (i, byte) in tx[3..].iter().enumerate() {
                        if offset + i < SREG_BLOCK {
                            block[offset + i] &= byte;
                        }
                    }
                    self.finish_write();
                }
            }
            0x44 | 0x64 => {
                if self.wel {
                    let address = Self::addr_from_tx(&tx);
                    let (block, _) = self.sreg_slot(address);
                    block.fill(0xff);
                    self.finish_write();
                }
            }
            0x4b => {
                return self.uid[..self.rx_size.min(self.uid.len())].to_vec();
            }
            _ => {
                log::warn!("mock flash: unhandled opcode {op:#04x}");
            }
        }
        vec![0; self.rx_size]
    }
}

impl FlashController for MockFlash {
    fn wait_not_busy(&mut self) {}

    fn clear_fifo(&mut self) {
        self.tx.clear();
        self.rx.clear();
    }

    fn set_rx_size(&mut self, size: usize) {
        self.rx_size = size;
    }

    fn set_fifo_width(&mut self, width: usize) {
        self.fifo_width = width;
    }

    fn write_fifo(&mut self, data: &[u8], _quad: bool) {
        self.tx.extend_from_slice(data);
    }

    fn write_command(&mut self, cmd: CmdWord) {
        self.log.push(cmd.opcode());
        let mut resp = self.execute(cmd);
        resp.resize(self.rx_size, 0);

        // Position the response for both RX paths: FIFO reads pop the
        // bytes in order, readback reads extract LSB-first after shifting
        // by the unused byte count. Responses longer than the readback
        // register only travel through the FIFO.
        self.readback = 0;
        if resp.len() <= 4 {
            for (i, byte) in resp.iter().enumerate() {
                self.readback |= u32::from(*byte) << (8 * (4 - resp.len() + i));
            }
        }
        self.rx = resp;
    }

    fn read_fifo(&mut self, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.rx.get(i).copied().unwrap_or(0);
        }
    }

    fn readback_word(&mut self) -> u32 {
        self.readback
    }

    fn delay_us(&mut self, _us: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi_flash::cmd;

    #[test]
    fn rdid_round_trips_through_readback() {
        let mut mock = MockFlash::new([0xc8, 0x40, 0x17]);
        assert_eq!(cmd::read_id(&mut mock), 0x1740c8);
        assert_eq!(mock.opcode_log(), &[0x9f]);
        // Readback transfers program the RX length as the FIFO width.
        assert_eq!(mock.last_fifo_width(), 3);
    }

    #[test]
    fn sr_writes_require_write_enable() {
        let mut mock = MockFlash::new([0xc8, 0x40, 0x17]);
        cmd::write_sr1(&mut mock, 0xfc);
        assert_eq!(mock.sr(), 0);

        cmd::write_enable(&mut mock);
        cmd::write_sr1(&mut mock, 0xfc);
        assert_eq!(mock.sr() & 0xfc, 0xfc);
    }

    #[test]
    fn wip_reports_busy_then_clears() {
        let mut mock = MockFlash::new([0xc8, 0x40, 0x17]);
        cmd::write_enable(&mut mock);
        cmd::write_sr1(&mut mock, 0x04);
        assert_eq!(cmd::read_sr1(&mut mock) & 0x01, 0x01);
        // Busy reads are bounded; the bit clears.
        for _ in 0..WIP_READS {
            let _ = cmd::read_sr1(&mut mock);
        }
        assert_eq!(cmd::read_sr1(&mut mock) & 0x01, 0x00);
    }

    #[test]
    fn program_is_and_erase_is_fill() {
        let mut mock = MockFlash::new([0xc8, 0x40, 0x17]);
        cmd::write_enable(&mut mock);
        cmd::page_program(&mut mock, 0x100, &[0x0f, 0xf0]);
        assert_eq!(&mock.memory()[0x100..0x102], &[0x0f, 0xf0]);

        // Programming again only clears bits.
        cmd::write_enable(&mut mock);
        cmd::page_program(&mut mock, 0x100, &[0xf0, 0xf0]);
        assert_eq!(&mock.memory()[0x100..0x102], &[0x00, 0xf0]);

        cmd::write_enable(&mut mock);
        cmd::erase_4k(&mut mock, 0x100);
        assert_eq!(&mock.memory()[0x100..0x102], &[0xff, 0xff]);
    }
}
