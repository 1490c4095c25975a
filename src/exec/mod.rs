// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`process`] spawns commands with `tokio::process::Command`, hands each
//!   child to a dedicated reaper task and exposes a cloneable
//!   [`ProcessHandle`]. The [`ProcessBackend`] trait lets tests swap in
//!   scripted children.
//! - [`framer`] turns the raw stdout/stderr byte streams into text lines.

pub mod framer;
pub mod process;

pub use framer::{FramedReader, LineFramer};
pub use process::{
    ChildProcess, OutputStream, ProcessBackend, ProcessHandle, ProcessState, SpawnedProcess,
    SystemBackend, spawn,
};
