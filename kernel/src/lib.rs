#![no_std]
#![allow(dead_code)]

//! Flash translation layer core for a virtual NVMe SSD.
//!
//! This crate is the address-translation, garbage-collection, and NAND
//! timing-simulation engine behind a virtual NVMe device. It owns none of
//! the hardware-facing surface (PCIe BAR/doorbells, admin-queue processing,
//! interrupt dispatch) — that lives in a separate controller crate and talks
//! to [`ftl::Namespace`] through [`ftl::io`]'s `process_io` entry point.
//!
//! The crate builds and tests the same way on the host target as it would
//! inside the kernel it's vendored into: everything here is plain
//! `no_std` + `alloc`, with no dependency on a particular boot environment.

extern crate alloc;

pub mod ftl;
