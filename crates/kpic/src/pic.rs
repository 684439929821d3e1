//! Legacy 8259 PIC (Programmable Interrupt Controller) driver.
//!
//! Two 8259 chips sit behind fixed port pairs: the master at 0x20/0x21 and
//! the slave at 0xA0/0xA1, with the slave's INT output cascaded into master
//! line 2. By default the master raises vectors 0x08-0x0F, colliding with
//! CPU exceptions, so the first thing a kernel does is remap both chips to
//! free vectors.
//!
//! Beyond remapping, the driver tracks the one piece of software state the
//! chips cannot report themselves — the configured vector bases — and uses
//! it to detect the classic 8259 spurious-interrupt hazard: line 7 of either
//! chip can fire with nothing actually in service, and acknowledging such a
//! phantom would clear in-service state belonging to a real interrupt.

use bitflags::bitflags;

use crate::port::PortBus;
#[cfg(target_arch = "x86_64")]
use crate::port::X86Bus;
#[cfg(target_arch = "x86_64")]
use spin::Mutex;

/// I/O port addresses for the master PIC.
const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;

/// I/O port addresses for the slave PIC.
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

bitflags! {
    /// ICW1: Initialization Command Word 1, written to a command port to
    /// begin the initialization sequence.
    pub struct Icw1: u8 {
        /// An ICW4 byte will follow.
        const ICW4_NEEDED = 0x01;
        /// Single chip, no cascade.
        const SINGLE = 0x02;
        /// Call address interval 4 (8 if clear).
        const INTERVAL4 = 0x04;
        /// Level-triggered (edge if clear).
        const LEVEL = 0x08;
        /// Required for any initialization.
        const INIT = 0x10;
    }

    /// ICW4: operating-mode word, last byte of the initialization sequence.
    pub struct Icw4: u8 {
        /// 8086/88 mode (as opposed to MCS-80/85 mode).
        const MODE_8086 = 0x01;
        /// Automatic EOI on interrupt acknowledge.
        const AUTO_EOI = 0x02;
        /// Buffered mode, slave.
        const BUFFERED_SLAVE = 0x08;
        /// Buffered mode, master.
        const BUFFERED_MASTER = 0x0C;
        /// Special fully nested mode.
        const FULLY_NESTED = 0x10;
    }
}

/// ICW3 for the master: a slave hangs off line 2 (bit mask).
const CASCADE_SLAVE_ON_LINE_2: u8 = 1 << 2;
/// ICW3 for the slave: its cascade identity on the master (plain number).
const CASCADE_IDENTITY: u8 = 2;

/// OCW3: select the interrupt request register for the next command-port read.
const OCW3_READ_IRR: u8 = 0x0A;
/// OCW3: select the in-service register for the next command-port read.
const OCW3_READ_ISR: u8 = 0x0B;

/// OCW2: non-specific End-Of-Interrupt.
const CMD_EOI: u8 = 0x20;

/// Conventional remap base for the master PIC (IRQ 0-7 → vectors 32-39).
pub const MASTER_OFFSET: u8 = 0x20;
/// Conventional remap base for the slave PIC (IRQ 8-15 → vectors 40-47).
pub const SLAVE_OFFSET: u8 = MASTER_OFFSET + 8;

/// The cascaded master/slave 8259 pair.
///
/// Owns the bus capability it was constructed with; every operation is a
/// bounded sequence of port transactions through it. The driver carries no
/// other state than the two vector bases and the spurious counter.
///
/// None of the operations are atomic with respect to a nested interrupt
/// that also touches the controllers (mask updates are read-modify-write,
/// register snapshots are two separate bus reads). Callers run them with
/// CPU interrupts masked; the driver does not enforce that itself.
pub struct DualPic<B> {
    bus: B,
    master_base: u8,
    slave_base: u8,
    spurious: u64,
}

impl<B: PortBus> DualPic<B> {
    /// Creates a driver over `bus` with the 8259 power-on vector bases
    /// (0 and 8). Call [`remap`](Self::remap) before enabling interrupts.
    pub const fn new(bus: B) -> Self {
        DualPic {
            bus,
            master_base: 0,
            slave_base: 8,
            spurious: 0,
        }
    }

    /// Reprograms both chips so master line *n* raises vector
    /// `master_offset + n` and slave line *n* raises `slave_offset + n`.
    ///
    /// Runs the full ICW1..ICW4 sequence on both chips, with a bus-settle
    /// delay after every initialization write. Line masks are saved up
    /// front and restored afterwards: remapping never silently unmasks a
    /// line. `slave_offset` should be `master_offset + 8` to keep the
    /// cascade layout contiguous, though any pair is accepted.
    ///
    /// The caller must have interrupts disabled; a vector delivered in the
    /// middle of the sequence leaves the chips half-programmed, and the
    /// only recovery is a full re-remap.
    pub fn remap(&mut self, master_offset: u8, slave_offset: u8) {
        self.master_base = master_offset;
        self.slave_base = slave_offset;

        // Masks survive the init sequence.
        let master_mask = self.bus.inb(PIC1_DATA);
        let slave_mask = self.bus.inb(PIC2_DATA);

        // ICW1: begin initialization (cascade mode, ICW4 needed).
        let icw1 = (Icw1::INIT | Icw1::ICW4_NEEDED).bits();
        self.bus.outb(PIC1_COMMAND, icw1);
        self.bus.io_wait();
        self.bus.outb(PIC2_COMMAND, icw1);
        self.bus.io_wait();

        // ICW2: vector bases.
        self.bus.outb(PIC1_DATA, master_offset);
        self.bus.io_wait();
        self.bus.outb(PIC2_DATA, slave_offset);
        self.bus.io_wait();

        // ICW3: cascade wiring.
        self.bus.outb(PIC1_DATA, CASCADE_SLAVE_ON_LINE_2);
        self.bus.io_wait();
        self.bus.outb(PIC2_DATA, CASCADE_IDENTITY);
        self.bus.io_wait();

        // ICW4: 8086 mode.
        self.bus.outb(PIC1_DATA, Icw4::MODE_8086.bits());
        self.bus.io_wait();
        self.bus.outb(PIC2_DATA, Icw4::MODE_8086.bits());
        self.bus.io_wait();

        self.bus.outb(PIC1_DATA, master_mask);
        self.bus.outb(PIC2_DATA, slave_mask);

        log::debug!(
            "8259 remapped: master base {:#04x}, slave base {:#04x}",
            master_offset,
            slave_offset
        );
    }

    /// Disables interrupt delivery for `line` (0-15). Lines 16 and up are
    /// ignored.
    pub fn set_mask(&mut self, line: u8) {
        if let Some((port, bit)) = line_port(line) {
            let value = self.bus.inb(port) | (1 << bit);
            self.bus.outb(port, value);
        }
    }

    /// Re-enables interrupt delivery for `line` (0-15). Lines 16 and up
    /// are ignored.
    pub fn clear_mask(&mut self, line: u8) {
        if let Some((port, bit)) = line_port(line) {
            let value = self.bus.inb(port) & !(1 << bit);
            self.bus.outb(port, value);
        }
    }

    /// Masks every line on both chips. This is how the PIC pair is parked
    /// before handing interrupt delivery over to the APIC.
    pub fn mask_all(&mut self) {
        self.bus.outb(PIC1_DATA, 0xFF);
        self.bus.outb(PIC2_DATA, 0xFF);
    }

    /// Returns the combined interrupt request register: bit *n* set means
    /// line *n* has a pending request. Master in the low byte, slave in
    /// the high byte.
    pub fn read_irq_request_register(&mut self) -> u16 {
        self.read_register(OCW3_READ_IRR)
    }

    /// Returns the combined in-service register: bit *n* set means line
    /// *n* is being serviced. Master in the low byte, slave in the high
    /// byte.
    ///
    /// The two chips are read in two separate bus transactions, so a line
    /// can transition between the halves; the result is a point-in-time
    /// snapshot, not an atomic one.
    pub fn read_in_service_register(&mut self) -> u16 {
        self.read_register(OCW3_READ_ISR)
    }

    fn read_register(&mut self, ocw3: u8) -> u16 {
        self.bus.outb(PIC1_COMMAND, ocw3);
        self.bus.outb(PIC2_COMMAND, ocw3);
        let master = self.bus.inb(PIC1_COMMAND) as u16;
        let slave = self.bus.inb(PIC2_COMMAND) as u16;
        (slave << 8) | master
    }

    /// Reports whether `vector` looks like a spurious interrupt.
    ///
    /// Only the lowest-priority line of either chip (line 7) can raise a
    /// phantom vector under this protocol: the chip commits to an
    /// interrupt cycle on a line that deasserted before the acknowledge,
    /// and falls back to line 7 with nothing in service. So the check is:
    /// vector is a line-7 vector *and* the corresponding in-service bit is
    /// clear. Every other vector is genuine by construction and the bus is
    /// not touched for it.
    pub fn is_spurious(&mut self, vector: u8) -> bool {
        if vector == self.master_base.wrapping_add(7) {
            self.read_in_service_register() & (1 << 7) == 0
        } else if vector == self.slave_base.wrapping_add(7) {
            self.read_in_service_register() & (1 << 15) == 0
        } else {
            false
        }
    }

    /// Acknowledges a handled interrupt, routing End-Of-Interrupt to the
    /// chip(s) that raised `vector`. Call exactly once per handled
    /// interrupt.
    ///
    /// Spurious vectors are counted instead of acknowledged: a real EOI
    /// for a phantom line-7 interrupt would clear in-service state that
    /// belongs to some other line. The one asymmetry is the cascade — for
    /// a slave-range vector the master always gets an EOI, spurious or
    /// not, because the master genuinely saw the cascade line fire.
    ///
    /// Vectors outside both configured ranges are ignored. The in-service
    /// register is sampled before any EOI is written; there is no window
    /// in which this driver acknowledges first and classifies after.
    pub fn acknowledge(&mut self, vector: u8) {
        let spurious = self.is_spurious(vector);

        if self.slave_owns(vector) {
            if spurious {
                self.count_spurious(vector);
            } else {
                self.bus.outb(PIC2_COMMAND, CMD_EOI);
            }
            // The cascade line on the master was genuinely in service
            // either way.
            self.bus.outb(PIC1_COMMAND, CMD_EOI);
        } else if self.master_owns(vector) {
            if spurious {
                self.count_spurious(vector);
            } else {
                self.bus.outb(PIC1_COMMAND, CMD_EOI);
            }
        }
    }

    /// Number of spurious interrupts detected since boot. Never resets.
    pub fn spurious_count(&self) -> u64 {
        self.spurious
    }

    /// Maps an IRQ line (0-15) to the CPU vector it currently raises, or
    /// `None` for lines 16 and up.
    pub fn vector_for_line(&self, line: u8) -> Option<u8> {
        match line {
            0..=7 => Some(self.master_base.wrapping_add(line)),
            8..=15 => Some(self.slave_base.wrapping_add(line - 8)),
            _ => None,
        }
    }

    fn master_owns(&self, vector: u8) -> bool {
        vector.wrapping_sub(self.master_base) < 8
    }

    fn slave_owns(&self, vector: u8) -> bool {
        vector.wrapping_sub(self.slave_base) < 8
    }

    fn count_spurious(&mut self, vector: u8) {
        self.spurious += 1;
        log::warn!(
            "spurious IRQ on vector {:#04x} ({} since boot)",
            vector,
            self.spurious
        );
    }
}

/// Resolves an IRQ line to its chip's data port and local bit index.
fn line_port(line: u8) -> Option<(u16, u8)> {
    match line {
        0..=7 => Some((PIC1_DATA, line)),
        8..=15 => Some((PIC2_DATA, line - 8)),
        _ => None,
    }
}

/// The machine's PIC pair, wired to real port I/O.
///
/// Interrupt handlers cannot thread an exclusive borrow down from the boot
/// stack, so the hardware-backed instance lives behind a spinlock. Lock it
/// only with interrupts disabled.
#[cfg(target_arch = "x86_64")]
pub static PICS: Mutex<DualPic<X86Bus>> = Mutex::new(DualPic::new(X86Bus));

/// Remaps the hardware PIC pair. Call once during boot, before enabling
/// interrupts.
#[cfg(target_arch = "x86_64")]
pub fn init(master_offset: u8, slave_offset: u8) {
    PICS.lock().remap(master_offset, slave_offset);
}
