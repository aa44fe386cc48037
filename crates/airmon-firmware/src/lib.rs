//! ESP32-S3 firmware-specific modules for airmon
//!
//! This crate contains the code that cannot compile on desktop targets:
//! peripheral setup, the Wi-Fi/IP stack and HTTP server tasks, and the ESP32
//! implementations of the core's platform hooks.

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod config;
pub mod hardware;
pub mod net;
pub mod system;
