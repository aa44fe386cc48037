//! Hardware-independent core library for airmon
//!
//! airmon is a sensor exporter: it polls environmental sensors and serves the
//! readings to a Prometheus scraper. This crate holds everything that does not
//! touch a peripheral: the metrics registry and its text exposition, the
//! `/metrics` HTTP front, the liveness watchdog with its reboot counter, the
//! key/value storage contract, SNTP packets, sensor traits and configuration.
//!
//! It is `no_std` and never allocates, so the same code runs on the ESP32-S3
//! firmware and in the desktop simulator and host tests.

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod config;
pub mod http;
pub mod metrics;
pub mod sensors;
pub mod sntp;
pub mod storage;
pub mod watchdog;
