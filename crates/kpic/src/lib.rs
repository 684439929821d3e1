//! Dual 8259 PIC (Programmable Interrupt Controller) driver.
//!
//! Drives the legacy master/slave 8259 pair found on every PC-compatible:
//! vector remapping, per-line masking, IRR/ISR snapshots, and
//! spurious-interrupt-aware End-Of-Interrupt dispatch.
//!
//! The driver itself is hardware-agnostic: all bus access goes through the
//! [`port::PortBus`] capability, so the same code runs against the real
//! x86 port space in a kernel and against a simulated register backend in
//! host-side unit tests. On x86_64 targets the crate also provides the
//! conventional locked [`pic::PICS`] instance wired to real port I/O.
#![cfg_attr(not(test), no_std)]

pub mod pic;
pub mod port;

pub use pic::DualPic;
pub use port::PortBus;
