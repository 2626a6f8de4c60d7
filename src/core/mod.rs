//! Core module containing the main functionality of Greenscreen
//!
//! This module provides:
//! - Transport layer for host connections (SSH, Telnet, virtual host)
//! - Key encodings for VT-style hosts
//! - Session management: connect, send, pump and wait
//! - Screen snapshots and field discovery
//! - Bounded navigation helpers
//! - Session transcripts
//! - A coordinator service for handing session options between processes

pub mod controller;
pub mod keys;
pub mod navigation;
pub mod poll;
pub mod screen;
pub mod session;
pub mod transcript;
pub mod transport;
