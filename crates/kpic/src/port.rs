//! x86 port I/O primitives and the bus-access capability.
//!
//! The driver never touches ports directly; it goes through [`PortBus`].
//! Kernels hand it [`X86Bus`], which wraps the raw `in`/`out` instructions.
//! Tests hand it a simulated backend instead.

/// Byte-granularity access to an I/O port space.
///
/// `io_wait` is a bus-settle delay with no observable side effect beyond
/// timing; the 8259 cannot absorb back-to-back configuration writes at full
/// bus speed on real hardware.
pub trait PortBus {
    /// Read a byte from `port`.
    fn inb(&mut self, port: u16) -> u8;

    /// Write a byte to `port`.
    fn outb(&mut self, port: u16, value: u8);

    /// Wait long enough for the last write to settle on the ISA bus.
    fn io_wait(&mut self);
}

/// Write a byte to an x86 I/O port.
///
/// # Safety
///
/// Writing to an arbitrary I/O port can have side effects on hardware.
/// The caller must ensure the port and value are valid.
#[cfg(target_arch = "x86_64")]
#[inline]
pub unsafe fn outb(port: u16, value: u8) {
    core::arch::asm!(
        "out dx, al",
        in("dx") port,
        in("al") value,
        options(nomem, nostack, preserves_flags)
    );
}

/// Read a byte from an x86 I/O port.
///
/// # Safety
///
/// Reading from an arbitrary I/O port can have side effects on hardware.
/// The caller must ensure the port is valid.
#[cfg(target_arch = "x86_64")]
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    core::arch::asm!(
        "in al, dx",
        in("dx") port,
        out("al") value,
        options(nomem, nostack, preserves_flags)
    );
    value
}

/// POST diagnostic port. Writes to it are harmless and slow enough to give
/// the 8259 time to latch the previous command.
#[cfg(target_arch = "x86_64")]
const POST_PORT: u16 = 0x80;

/// The machine's real port space.
///
/// A zero-sized token; constructing one asserts nothing, but the only
/// instance the crate hands out lives inside [`crate::pic::PICS`], so all
/// hardware access funnels through that lock.
#[cfg(target_arch = "x86_64")]
pub struct X86Bus;

#[cfg(target_arch = "x86_64")]
impl PortBus for X86Bus {
    #[inline]
    fn inb(&mut self, port: u16) -> u8 {
        unsafe { inb(port) }
    }

    #[inline]
    fn outb(&mut self, port: u16, value: u8) {
        unsafe { outb(port, value) }
    }

    #[inline]
    fn io_wait(&mut self) {
        unsafe { outb(POST_PORT, 0) }
    }
}
