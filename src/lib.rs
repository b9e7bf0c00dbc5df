//! A simulator for the LC-3 educational computer.
//!
//! Load a program with [`memory::image::Image`], then drive a
//! [`processor::Processor`] against a [`memory::Memory`] and a
//! [`console::Console`] until it halts.

pub mod console;
pub mod memory;
pub mod processor;
